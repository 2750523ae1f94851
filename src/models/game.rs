//! Matches (group stage or bracket leaf) and their set-based scores.

use crate::error::{TournamentError, TournamentResult};
use crate::models::bracket::{NodeId, Phase};
use crate::models::group::GroupId;
use crate::models::tournament::TournamentId;
use crate::models::unit::{StatsDelta, UnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a match.
pub type MatchId = Uuid;

/// Most games a side can take in one set (long tie-break sets included).
pub const MAX_GAMES_PER_SET: u32 = 99;
/// Most sets a single match can carry.
pub const MAX_SETS: usize = 9;

/// One side of a match.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

/// Games won by each side in one set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SetScore {
    pub a: u32,
    pub b: u32,
}

impl SetScore {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }
}

/// Per-side totals derived from a score.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SideTotals {
    pub sets_won: u32,
    pub sets_lost: u32,
    pub games_won: u32,
    pub games_lost: u32,
}

/// A match score: the list of set scores in playing order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score {
    pub sets: Vec<SetScore>,
}

impl Score {
    pub fn new(sets: Vec<SetScore>) -> Self {
        Self { sets }
    }

    /// Build from `(a, b)` tuples.
    pub fn from_pairs(pairs: &[(u32, u32)]) -> Self {
        Self {
            sets: pairs.iter().map(|&(a, b)| SetScore::new(a, b)).collect(),
        }
    }

    /// Reject scores that cannot produce a winner (no sets, a tied set, equal sets won)
    /// and scores outside [`MAX_SETS`] / [`MAX_GAMES_PER_SET`].
    pub fn validate(&self) -> TournamentResult<()> {
        if self.sets.is_empty() {
            return Err(TournamentError::validation("Score must contain at least one set"));
        }
        if self.sets.len() > MAX_SETS {
            return Err(TournamentError::validation(format!(
                "A match has at most {MAX_SETS} sets (got {})",
                self.sets.len()
            )));
        }
        if let Some(pos) = self
            .sets
            .iter()
            .position(|s| s.a > MAX_GAMES_PER_SET || s.b > MAX_GAMES_PER_SET)
        {
            return Err(TournamentError::validation(format!(
                "Set {} has more than {MAX_GAMES_PER_SET} games for one side",
                pos + 1
            )));
        }
        if let Some(pos) = self.sets.iter().position(|s| s.a == s.b) {
            return Err(TournamentError::validation(format!(
                "Set {} is tied; every set needs a winner",
                pos + 1
            )));
        }
        let a = self.totals(Side::A);
        if a.sets_won == a.sets_lost {
            return Err(TournamentError::validation(
                "Both sides won the same number of sets",
            ));
        }
        Ok(())
    }

    pub fn totals(&self, side: Side) -> SideTotals {
        self.sets.iter().fold(SideTotals::default(), |mut t, s| {
            let (mine, theirs) = match side {
                Side::A => (s.a, s.b),
                Side::B => (s.b, s.a),
            };
            t.games_won = t.games_won.saturating_add(mine);
            t.games_lost = t.games_lost.saturating_add(theirs);
            if mine > theirs {
                t.sets_won += 1;
            } else if theirs > mine {
                t.sets_lost += 1;
            }
            t
        })
    }

    /// Winning side, or None when the score is not decisive.
    pub fn winner(&self) -> Option<Side> {
        let a = self.totals(Side::A);
        match a.sets_won.cmp(&a.sets_lost) {
            std::cmp::Ordering::Greater => Some(Side::A),
            std::cmp::Ordering::Less => Some(Side::B),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Finished,
}

/// Where a match belongs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum MatchKind {
    Grupo { group_id: GroupId },
    Eliminatoria { node_id: NodeId, phase: Phase },
}

/// A single match between two units.
///
/// There is no stored winner: it is always derived from `score`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub kind: MatchKind,
    pub unit_a: UnitId,
    pub unit_b: UnitId,
    pub score: Option<Score>,
    pub status: MatchStatus,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(tournament_id: TournamentId, kind: MatchKind, unit_a: UnitId, unit_b: UnitId) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            kind,
            unit_a,
            unit_b,
            score: None,
            status: MatchStatus::Scheduled,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    pub fn group_id(&self) -> Option<GroupId> {
        match self.kind {
            MatchKind::Grupo { group_id } => Some(group_id),
            MatchKind::Eliminatoria { .. } => None,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self.kind {
            MatchKind::Eliminatoria { node_id, .. } => Some(node_id),
            MatchKind::Grupo { .. } => None,
        }
    }

    pub fn unit(&self, side: Side) -> UnitId {
        match side {
            Side::A => self.unit_a,
            Side::B => self.unit_b,
        }
    }

    pub fn involves(&self, unit: UnitId) -> bool {
        self.unit_a == unit || self.unit_b == unit
    }

    /// Winner derived from the recorded score.
    pub fn winner(&self) -> Option<UnitId> {
        self.score
            .as_ref()
            .and_then(Score::winner)
            .map(|side| self.unit(side))
    }

    /// Statistics each unit earns from this match's recorded score.
    /// Empty when the match has no result.
    pub fn stat_deltas(&self, points_for_win: i32, points_for_loss: i32) -> Vec<(UnitId, StatsDelta)> {
        let Some(score) = self.score.as_ref() else {
            return Vec::new();
        };
        let Some(winner) = score.winner() else {
            return Vec::new();
        };
        [Side::A, Side::B]
            .into_iter()
            .map(|side| {
                let t = score.totals(side);
                let won = side == winner;
                let delta = StatsDelta {
                    jogos: 1,
                    vitorias: i32::from(won),
                    derrotas: i32::from(!won),
                    pontos: if won { points_for_win } else { points_for_loss },
                    sets_vencidos: clamp_i32(t.sets_won),
                    sets_perdidos: clamp_i32(t.sets_lost),
                    games_vencidos: clamp_i32(t.games_won),
                    games_perdidos: clamp_i32(t.games_lost),
                };
                (self.unit(side), delta)
            })
            .collect()
    }
}

fn clamp_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
