//! Registered players and the partner-history ledger.

use crate::models::tournament::TournamentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a player registration.
pub type PlayerId = Uuid;

/// Identity of a person inside an arena, stable across tournaments: the
/// registered name, trimmed, lowercased and with inner whitespace collapsed.
pub type PlayerKey = String;

pub fn player_key(name: &str) -> PlayerKey {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A player registered in a tournament.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub tournament_id: TournamentId,
    pub name: String,
    /// Protected seed ("cabeça de chave"): never paired with another protected seed
    /// while the partner history still has unused combinations.
    pub cabeca_de_chave: bool,
    /// Team name, only meaningful in the team format.
    pub equipe: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl Player {
    pub fn new(tournament_id: TournamentId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            name: name.into(),
            cabeca_de_chave: false,
            equipe: None,
            registered_at: Utc::now(),
        }
    }

    pub fn seeded(mut self) -> Self {
        self.cabeca_de_chave = true;
        self
    }

    pub fn in_team(mut self, equipe: impl Into<String>) -> Self {
        self.equipe = Some(equipe.into());
        self
    }

    /// Partner-history identity; the same person keeps it in every tournament of the arena.
    pub fn key(&self) -> PlayerKey {
        player_key(&self.name)
    }
}

/// One recorded partnership: who, and which tournament formed it.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Partnership {
    pub partner: PlayerKey,
    pub tournament_id: TournamentId,
}

/// Who has already partnered whom across an arena's tournaments, keyed by [`PlayerKey`].
///
/// Owned by the repository layer and passed into the pairing engine; every
/// pair is stored under both players.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartnerHistory {
    entries: HashMap<PlayerKey, Vec<Partnership>>,
}

impl PartnerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair formed in `tournament_id` (stored in both directions).
    pub fn record(&mut self, a: &str, b: &str, tournament_id: TournamentId) {
        self.entries.entry(a.to_owned()).or_default().push(Partnership {
            partner: b.to_owned(),
            tournament_id,
        });
        self.entries.entry(b.to_owned()).or_default().push(Partnership {
            partner: a.to_owned(),
            tournament_id,
        });
    }

    /// Drop every pair formed in `tournament_id`. Returns how many pairs were removed.
    pub fn remove_tournament(&mut self, tournament_id: TournamentId) -> usize {
        let mut removed = 0;
        for list in self.entries.values_mut() {
            let before = list.len();
            list.retain(|p| p.tournament_id != tournament_id);
            removed += before - list.len();
        }
        self.entries.retain(|_, list| !list.is_empty());
        removed / 2
    }

    pub fn have_partnered(&self, a: &str, b: &str) -> bool {
        self.times_partnered(a, b) > 0
    }

    /// How many times `a` and `b` have played together.
    pub fn times_partnered(&self, a: &str, b: &str) -> usize {
        self.entries
            .get(a)
            .map_or(0, |list| list.iter().filter(|p| p.partner == b).count())
    }

    /// True when every possible pairing among `roster` has already happened at least once.
    pub fn is_exhausted_for(&self, roster: &[PlayerKey]) -> bool {
        roster.iter().enumerate().all(|(i, a)| {
            roster[i + 1..]
                .iter()
                .all(|b| self.have_partnered(a, b))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_case_and_spacing() {
        assert_eq!(player_key("  Ana   Souza "), "ana souza");
        let t = Uuid::new_v4();
        assert_eq!(Player::new(t, "ANA souza").key(), Player::new(Uuid::new_v4(), "Ana Souza").key());
    }

    #[test]
    fn record_is_symmetric_and_removable_per_tournament() {
        let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut h = PartnerHistory::new();
        h.record("ana", "bia", t1);
        h.record("ana", "caio", t2);
        h.record("ana", "caio", t2);
        assert!(h.have_partnered("bia", "ana"));
        assert_eq!(h.times_partnered("caio", "ana"), 2);

        assert_eq!(h.remove_tournament(t1), 1);
        assert!(!h.have_partnered("ana", "bia"));
        assert!(h.have_partnered("caio", "ana"));
    }

    #[test]
    fn exhaustion_needs_every_pair() {
        let keys: Vec<PlayerKey> = ["a", "b", "c"].iter().map(|k| k.to_string()).collect();
        let t = Uuid::new_v4();
        let mut h = PartnerHistory::new();
        h.record("a", "b", t);
        h.record("b", "c", t);
        assert!(!h.is_exhausted_for(&keys));
        h.record("a", "c", t);
        assert!(h.is_exhausted_for(&keys));
    }
}
