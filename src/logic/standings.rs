//! Group standings with the tie-break cascade.
//!
//! Order of criteria:
//! 1. points
//! 2. game difference
//! 3. head-to-head, only when exactly two units are still tied
//! 4. set difference
//! 5. games won
//! 6. draw (random, or by unit id under [`TieBreakPolicy::Deterministic`])

use crate::models::{Match, PointsRule, UnitId, UnitStats};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// How ties that survive every sporting criterion are settled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Uniform random draw.
    #[default]
    Random,
    /// Ascending unit id, reproducible.
    Deterministic,
}

impl std::str::FromStr for TieBreakPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" | "sorteio" => Ok(TieBreakPolicy::Random),
            "deterministic" | "deterministico" => Ok(TieBreakPolicy::Deterministic),
            other => Err(format!("unknown tie-break policy: {other}")),
        }
    }
}

/// One line of a group table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub unit_id: UnitId,
    /// 1-based.
    pub posicao: u32,
    pub stats: UnitStats,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Standings {
    pub rows: Vec<StandingRow>,
    /// Units whose relative order came from a draw (empty when fully decided on the court).
    pub drawn: Vec<UnitId>,
}

impl Standings {
    pub fn position_of(&self, unit: UnitId) -> Option<u32> {
        self.rows.iter().find(|r| r.unit_id == unit).map(|r| r.posicao)
    }

    pub fn unit_at(&self, posicao: u32) -> Option<UnitId> {
        self.rows.iter().find(|r| r.posicao == posicao).map(|r| r.unit_id)
    }
}

/// Statistics of each unit counting only the finished matches given.
pub fn group_stats(units: &[UnitId], matches: &[Match], points: PointsRule) -> HashMap<UnitId, UnitStats> {
    let mut stats: HashMap<UnitId, UnitStats> = units.iter().map(|&u| (u, UnitStats::default())).collect();
    for m in matches.iter().filter(|m| m.is_finished()) {
        for (unit, delta) in m.stat_deltas(points.win, points.loss) {
            if let Some(s) = stats.get_mut(&unit) {
                s.apply(&delta);
            }
        }
    }
    stats
}

/// Criteria 1 and 2: points, then game difference (descending).
fn primary(a: &UnitStats, b: &UnitStats) -> Ordering {
    b.pontos
        .cmp(&a.pontos)
        .then_with(|| b.saldo_games().cmp(&a.saldo_games()))
}

/// Criteria 4 and 5: set difference, then games won (descending).
fn secondary(a: &UnitStats, b: &UnitStats) -> Ordering {
    b.saldo_sets()
        .cmp(&a.saldo_sets())
        .then_with(|| b.games_vencidos.cmp(&a.games_vencidos))
}

/// Every deterministic criterion except head-to-head. Used to order units coming from
/// different groups, which never met.
pub fn compare_without_head_to_head(a: &UnitStats, b: &UnitStats) -> Ordering {
    primary(a, b).then_with(|| secondary(a, b))
}

/// Winner of the finished match between `a` and `b`, if they played.
fn head_to_head(a: UnitId, b: UnitId, matches: &[Match]) -> Option<UnitId> {
    matches
        .iter()
        .filter(|m| m.is_finished() && m.involves(a) && m.involves(b))
        .find_map(Match::winner)
}

/// Split a sorted slice into runs of equal elements under `eq`.
fn runs<T: Copy>(items: &[T], mut eq: impl FnMut(&T, &T) -> bool) -> Vec<Vec<T>> {
    let mut out: Vec<Vec<T>> = Vec::new();
    for &item in items {
        match out.last_mut() {
            Some(run) if eq(&run[0], &item) => run.push(item),
            _ => out.push(vec![item]),
        }
    }
    out
}

/// Rank the units of one group from its matches.
pub fn resolve_standings<R: Rng + ?Sized>(
    units: &[UnitId],
    matches: &[Match],
    points: PointsRule,
    policy: TieBreakPolicy,
    rng: &mut R,
) -> Standings {
    let stats = group_stats(units, matches, points);
    let st = |u: &UnitId| stats.get(u).copied().unwrap_or_default();

    let mut ordered: Vec<UnitId> = units.to_vec();
    ordered.sort_by(|a, b| primary(&st(a), &st(b)));

    let mut ranking: Vec<UnitId> = Vec::with_capacity(units.len());
    let mut drawn: Vec<UnitId> = Vec::new();

    for block in runs(&ordered, |a, b| primary(&st(a), &st(b)) == Ordering::Equal) {
        if block.len() == 1 {
            ranking.push(block[0]);
            continue;
        }
        if block.len() == 2 {
            if let Some(w) = head_to_head(block[0], block[1], matches) {
                let l = if w == block[0] { block[1] } else { block[0] };
                ranking.extend([w, l]);
                continue;
            }
        }

        let mut rest = block;
        rest.sort_by(|a, b| secondary(&st(a), &st(b)));
        for mut tied in runs(&rest, |a, b| secondary(&st(a), &st(b)) == Ordering::Equal) {
            if tied.len() > 1 {
                match policy {
                    TieBreakPolicy::Random => tied.shuffle(rng),
                    TieBreakPolicy::Deterministic => tied.sort(),
                }
                drawn.extend(tied.iter().copied());
            }
            ranking.extend(tied);
        }
    }

    Standings {
        rows: ranking
            .into_iter()
            .enumerate()
            .map(|(i, unit_id)| StandingRow {
                unit_id,
                posicao: i as u32 + 1,
                stats: st(&unit_id),
            })
            .collect(),
        drawn,
    }
}
