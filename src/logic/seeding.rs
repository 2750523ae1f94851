//! Single-elimination seeding for any number of qualifiers.
//!
//! Qualifiers are seeded 1..N, the bracket is padded to the next power of two with
//! BYEs, and seeds are placed with the classic halving order (1 v P, 2 v P-1, ...).
//! Pairings of two units from the same group are then repaired by swapping where a
//! collision-free swap exists.

use crate::error::{TournamentError, TournamentResult};
use crate::logic::standings::compare_without_head_to_head;
use crate::models::{group_letter, BracketNode, Phase, Slot, TournamentId, UnitId, UnitStats};

/// Largest field a bracket can hold (eight round-of-16 nodes).
pub const MAX_ENTRANTS: usize = 16;

/// A unit that qualified out of its group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Qualifier {
    pub unit_id: UnitId,
    /// 0-based group index (`Grupo A` = 0).
    pub group_index: usize,
    /// 1-based position inside the group.
    pub posicao: u32,
    pub stats: UnitStats,
}

impl Qualifier {
    /// Display origin, e.g. `1º Grupo A`.
    pub fn label(&self) -> String {
        format!("{}º Grupo {}", self.posicao, group_letter(self.group_index))
    }
}

/// Sort qualifiers into seed order: every 1st place, then every 2nd place, and so on.
/// Same-position units are ordered by points, game difference, set difference and games
/// won; a remaining tie keeps group order.
pub fn order_qualifiers(mut qualifiers: Vec<Qualifier>) -> Vec<Qualifier> {
    qualifiers.sort_by(|a, b| {
        a.posicao
            .cmp(&b.posicao)
            .then_with(|| compare_without_head_to_head(&a.stats, &b.stats))
            .then_with(|| a.group_index.cmp(&b.group_index))
    });
    qualifiers
}

/// Canonical seed order for a power-of-two bracket: `order(1) = [1]`,
/// `order(2k) = interleave(order(k), order(k).map(|s| 2k + 1 - s))`.
pub fn bracket_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    let mut k = 1;
    while k < size {
        let mirrored: Vec<usize> = order.iter().map(|&s| 2 * k + 1 - s).collect();
        order = order
            .iter()
            .zip(&mirrored)
            .flat_map(|(&a, &b)| [a, b])
            .collect();
        k *= 2;
    }
    order
}

/// Seed pairs for `n` entrants before any collision repair. A seed above `n` is a BYE.
pub fn seed_pairings(n: usize) -> Vec<(usize, usize)> {
    let size = n.max(1).next_power_of_two();
    bracket_order(size)
        .chunks_exact(2)
        .map(|c| (c[0], c[1]))
        .collect()
}

/// Outcome of seeding: the phase the bracket starts in and its first-round pairs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SeededBracket {
    pub phase: Phase,
    /// Entrant count (N).
    pub entrants: usize,
    /// Seed index pairs (1-based into the ordered qualifiers; above N means BYE).
    pub pairings: Vec<(usize, usize)>,
    /// Indices into `pairings` of same-group pairs no swap could fix.
    pub unresolved: Vec<usize>,
}

impl SeededBracket {
    pub fn bye_count(&self) -> usize {
        self.pairings
            .iter()
            .filter(|&&(a, b)| a > self.entrants || b > self.entrants)
            .count()
    }
}

/// Seed `qualifiers` (already in seed order) and repair same-group collisions.
pub fn seed_bracket(qualifiers: &[Qualifier]) -> TournamentResult<SeededBracket> {
    let n = qualifiers.len();
    if n < 2 {
        return Err(TournamentError::validation(format!(
            "An elimination bracket needs at least 2 qualifiers (got {n})"
        )));
    }
    if n > MAX_ENTRANTS {
        return Err(TournamentError::validation(format!(
            "At most {MAX_ENTRANTS} qualifiers fit the bracket (got {n})"
        )));
    }
    let first_group = qualifiers[0].group_index;
    if qualifiers.iter().all(|q| q.group_index == first_group) {
        return Err(TournamentError::validation(
            "All qualifiers come from a single group; the group stage already decides the competition",
        ));
    }

    let group_of = |seed: usize| qualifiers[seed - 1].group_index;
    let is_real = |p: &(usize, usize)| p.0 <= n && p.1 <= n;
    let collides = |p: (usize, usize)| p.0 <= n && p.1 <= n && group_of(p.0) == group_of(p.1);

    let mut pairings = seed_pairings(n);
    let mut unresolved = Vec::new();

    for i in 0..pairings.len() {
        if !collides(pairings[i]) {
            continue;
        }
        let forward = (i + 1..pairings.len()).collect::<Vec<_>>();
        let backward = (0..i).rev().collect::<Vec<_>>();

        let swap_seconds = |pairings: &mut Vec<(usize, usize)>, j: usize| {
            let (fi, si) = pairings[i];
            let (fj, sj) = pairings[j];
            if is_real(&pairings[j]) && !collides((fi, sj)) && !collides((fj, si)) {
                pairings[i] = (fi, sj);
                pairings[j] = (fj, si);
                true
            } else {
                false
            }
        };
        let swap_firsts = |pairings: &mut Vec<(usize, usize)>, j: usize| {
            let (fi, si) = pairings[i];
            let (fj, sj) = pairings[j];
            if is_real(&pairings[j]) && !collides((fj, si)) && !collides((fi, sj)) {
                pairings[i] = (fj, si);
                pairings[j] = (fi, sj);
                true
            } else {
                false
            }
        };

        let fixed = forward.iter().any(|&j| swap_seconds(&mut pairings, j))
            || backward.iter().any(|&j| swap_seconds(&mut pairings, j))
            || forward
                .iter()
                .chain(backward.iter())
                .any(|&j| swap_firsts(&mut pairings, j));

        if !fixed {
            let (a, b) = pairings[i];
            log::warn!(
                "Unavoidable same-group pairing: {} vs {}",
                qualifiers[a - 1].label(),
                qualifiers[b - 1].label()
            );
            unresolved.push(i);
        }
    }

    Ok(SeededBracket {
        phase: Phase::for_entrants(n),
        entrants: n,
        pairings,
        unresolved,
    })
}

/// Turn seeded pairs into the first-round bracket nodes.
pub fn first_round_nodes(
    tournament_id: TournamentId,
    qualifiers: &[Qualifier],
    seeded: &SeededBracket,
) -> Vec<BracketNode> {
    let slot = |seed: usize| match qualifiers.get(seed.wrapping_sub(1)) {
        Some(q) => (Slot::Unit(q.unit_id), q.label()),
        None => (Slot::Bye, "BYE".to_string()),
    };
    seeded
        .pairings
        .iter()
        .enumerate()
        .map(|(i, &(a, b))| {
            let (slot_a, label_a) = slot(a);
            let (slot_b, label_b) = slot(b);
            BracketNode::new(tournament_id, seeded.phase, i as u32 + 1, slot_a, slot_b)
                .with_origins(label_a, label_b)
        })
        .collect()
}
