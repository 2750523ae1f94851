//! Duo formation: turns a roster into pairs while keeping protected seeds apart
//! and avoiding partners who already played together.

use crate::error::{TournamentError, TournamentResult};
use crate::models::{PartnerHistory, Player, PlayerId, PlayerKey};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Result of pairing a roster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PairingOutcome {
    /// `(first, second)`; a protected seed is always `first` in its pair.
    pub pairs: Vec<(PlayerId, PlayerId)>,
    /// Pairs that already happened before (0 when history allowed a fully fresh pairing).
    pub repeated: usize,
    /// True when every combination was already used and pairing fell back to a plain shuffle.
    pub unconstrained: bool,
}

/// Pair every player of `players`.
///
/// 1. Odd rosters are rejected.
/// 2. If `history` already contains every possible pairing of this roster and there are at
///    least two protected seeds, pairs are drawn at random.
/// 3. Otherwise each protected seed gets a non-protected partner first, then the remaining
///    non-protected players are paired among themselves. Each partner is the candidate with the
///    fewest previous partnerships; `attempts` randomized passes are made and the one with the
///    fewest repeats wins.
pub fn form_pairs<R: Rng + ?Sized>(
    players: &[Player],
    history: &PartnerHistory,
    attempts: usize,
    rng: &mut R,
) -> TournamentResult<PairingOutcome> {
    if players.is_empty() {
        return Err(TournamentError::validation("No players registered"));
    }
    if players.len() % 2 != 0 {
        return Err(TournamentError::validation(format!(
            "Odd number of players ({}); every player needs a partner",
            players.len()
        )));
    }

    let ledger = Ledger {
        history,
        keys: players.iter().map(|p| (p.id, p.key())).collect(),
    };
    let roster: Vec<PlayerId> = players.iter().map(|p| p.id).collect();
    let roster_keys: Vec<PlayerKey> = players.iter().map(Player::key).collect();
    let (protected, others): (Vec<&Player>, Vec<&Player>) =
        players.iter().partition(|p| p.cabeca_de_chave);
    let protected: Vec<PlayerId> = protected.iter().map(|p| p.id).collect();
    let others: Vec<PlayerId> = others.iter().map(|p| p.id).collect();

    if protected.len() >= 2 && history.is_exhausted_for(&roster_keys) {
        let mut shuffled = roster;
        shuffled.shuffle(rng);
        let pairs: Vec<_> = shuffled.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        log::info!(
            "Partner history exhausted for {} players; pairing at random",
            players.len()
        );
        return Ok(PairingOutcome {
            repeated: pairs.len(),
            pairs,
            unconstrained: true,
        });
    }

    if protected.len() > others.len() {
        return Err(TournamentError::validation(format!(
            "{} protected seeds but only {} other players; seeds cannot be kept apart",
            protected.len(),
            others.len()
        )));
    }

    let mut best: Option<(Vec<(PlayerId, PlayerId)>, usize)> = None;
    for _ in 0..attempts.max(1) {
        let pairs = greedy_pass(&protected, &others, &ledger, rng);
        let repeated = pairs.iter().filter(|&&(a, b)| ledger.times(a, b) > 0).count();
        let improved = best.as_ref().map_or(true, |(_, r)| repeated < *r);
        if improved {
            best = Some((pairs, repeated));
        }
        if repeated == 0 {
            break;
        }
    }

    let (pairs, repeated) = best.unwrap_or_default();
    if repeated > 0 {
        log::info!("{} pair(s) repeat an earlier partnership", repeated);
    }
    Ok(PairingOutcome {
        pairs,
        repeated,
        unconstrained: false,
    })
}

/// Partner-history lookups by registration id.
struct Ledger<'a> {
    history: &'a PartnerHistory,
    keys: HashMap<PlayerId, PlayerKey>,
}

impl Ledger<'_> {
    fn times(&self, a: PlayerId, b: PlayerId) -> usize {
        match (self.keys.get(&a), self.keys.get(&b)) {
            (Some(ka), Some(kb)) => self.history.times_partnered(ka, kb),
            _ => 0,
        }
    }
}

/// One randomized greedy pass.
fn greedy_pass<R: Rng + ?Sized>(
    protected: &[PlayerId],
    others: &[PlayerId],
    ledger: &Ledger<'_>,
    rng: &mut R,
) -> Vec<(PlayerId, PlayerId)> {
    let mut seeds = protected.to_vec();
    let mut pool = others.to_vec();
    seeds.shuffle(rng);
    pool.shuffle(rng);

    let mut pairs = Vec::with_capacity((seeds.len() + pool.len()) / 2);
    for seed in seeds {
        let idx = least_partnered(seed, &pool, ledger);
        pairs.push((seed, pool.swap_remove(idx)));
    }
    while pool.len() >= 2 {
        let first = pool.swap_remove(0);
        let idx = least_partnered(first, &pool, ledger);
        pairs.push((first, pool.swap_remove(idx)));
    }
    pairs
}

/// Index in `pool` of the candidate who partnered `player` the fewest times.
fn least_partnered(player: PlayerId, pool: &[PlayerId], ledger: &Ledger<'_>) -> usize {
    pool.iter()
        .enumerate()
        .min_by_key(|(_, c)| ledger.times(player, **c))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn roster(n: usize, seeds: usize) -> Vec<Player> {
        let t = Uuid::new_v4();
        (0..n)
            .map(|i| {
                let p = Player::new(t, format!("P{i}"));
                if i < seeds {
                    p.seeded()
                } else {
                    p
                }
            })
            .collect()
    }

    #[test]
    fn odd_roster_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = form_pairs(&roster(7, 0), &PartnerHistory::new(), 10, &mut rng).unwrap_err();
        assert!(matches!(err, TournamentError::Validation(_)));
    }

    #[test]
    fn too_many_seeds_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = form_pairs(&roster(6, 4), &PartnerHistory::new(), 10, &mut rng).unwrap_err();
        assert!(matches!(err, TournamentError::Validation(_)));
    }

    #[test]
    fn protected_seeds_never_share_a_pair() {
        let players = roster(12, 6);
        let seeds: Vec<PlayerId> = players.iter().filter(|p| p.cabeca_de_chave).map(|p| p.id).collect();
        for s in 0..20 {
            let mut rng = StdRng::seed_from_u64(s);
            let out = form_pairs(&players, &PartnerHistory::new(), 5, &mut rng).unwrap();
            assert_eq!(out.pairs.len(), 6);
            for (a, b) in &out.pairs {
                assert!(!(seeds.contains(a) && seeds.contains(b)));
            }
        }
    }

    fn everyone_partnered(players: &[Player]) -> PartnerHistory {
        let mut history = PartnerHistory::new();
        let old = Uuid::new_v4();
        for (i, a) in players.iter().enumerate() {
            for b in &players[i + 1..] {
                history.record(&a.key(), &b.key(), old);
            }
        }
        history
    }

    #[test]
    fn avoids_previous_partners_when_possible() {
        let players = roster(4, 0);
        let mut history = PartnerHistory::new();
        let old = Uuid::new_v4();
        history.record(&players[0].key(), &players[1].key(), old);
        history.record(&players[2].key(), &players[3].key(), old);
        let mut rng = StdRng::seed_from_u64(7);
        let out = form_pairs(&players, &history, 50, &mut rng).unwrap();
        assert_eq!(out.repeated, 0);
        assert!(!out.unconstrained);
    }

    #[test]
    fn history_follows_the_name_not_the_registration() {
        let earlier = roster(4, 0);
        let mut history = PartnerHistory::new();
        let old = Uuid::new_v4();
        history.record(&earlier[0].key(), &earlier[1].key(), old);
        history.record(&earlier[2].key(), &earlier[3].key(), old);

        // Same people registered again in another tournament, with new ids.
        let again: Vec<Player> = earlier
            .iter()
            .map(|p| Player::new(Uuid::new_v4(), p.name.to_uppercase()))
            .collect();
        for s in 0..20 {
            let mut rng = StdRng::seed_from_u64(s);
            let out = form_pairs(&again, &history, 50, &mut rng).unwrap();
            assert_eq!(out.repeated, 0, "seed {s}");
        }
    }

    #[test]
    fn exhausted_history_with_two_seeds_pairs_at_random() {
        let players = roster(4, 2);
        let history = everyone_partnered(&players);
        let mut rng = StdRng::seed_from_u64(3);
        let out = form_pairs(&players, &history, 10, &mut rng).unwrap();
        assert!(out.unconstrained);
        assert_eq!(out.pairs.len(), 2);
    }

    #[test]
    fn exhausted_history_without_seeds_still_prefers_least_partnered() {
        let players = roster(4, 0);
        let mut history = everyone_partnered(&players);
        let again = Uuid::new_v4();
        history.record(&players[0].key(), &players[1].key(), again);
        history.record(&players[2].key(), &players[3].key(), again);
        for s in 0..20 {
            let mut rng = StdRng::seed_from_u64(s);
            let out = form_pairs(&players, &history, 50, &mut rng).unwrap();
            assert!(!out.unconstrained);
            assert_eq!(out.repeated, 2);
            for &(a, b) in &out.pairs {
                let pair = [a, b];
                assert!(!(pair.contains(&players[0].id) && pair.contains(&players[1].id)));
                assert!(!(pair.contains(&players[2].id) && pair.contains(&players[3].id)));
            }
        }
    }
}
