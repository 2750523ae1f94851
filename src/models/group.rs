//! Round-robin groups.

use crate::models::tournament::TournamentId;
use crate::models::unit::UnitId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a group.
pub type GroupId = Uuid;

/// A group of units playing each other once.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub tournament_id: TournamentId,
    /// 0-based position; `Grupo A` is 0.
    pub index: usize,
    pub name: String,
    pub units: Vec<UnitId>,
    pub total_partidas: u32,
    pub partidas_finalizadas: u32,
    /// The only gate for generating the elimination phase.
    pub completo: bool,
}

impl Group {
    pub fn new(tournament_id: TournamentId, index: usize, units: Vec<UnitId>) -> Self {
        let n = units.len() as u32;
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            index,
            name: format!("Grupo {}", group_letter(index)),
            units,
            total_partidas: n * n.saturating_sub(1) / 2,
            partidas_finalizadas: 0,
            completo: false,
        }
    }

    /// Count one more finished match and refresh `completo`.
    pub fn record_finished(&mut self) {
        self.partidas_finalizadas = (self.partidas_finalizadas + 1).min(self.total_partidas);
        self.refresh_completo();
    }

    /// Count one fewer finished match (a result was removed).
    pub fn record_unfinished(&mut self) {
        self.partidas_finalizadas = self.partidas_finalizadas.saturating_sub(1);
        self.refresh_completo();
    }

    fn refresh_completo(&mut self) {
        self.completo = self.total_partidas > 0 && self.partidas_finalizadas == self.total_partidas;
    }
}

/// `0 -> 'A'`, `1 -> 'B'`, ...
pub fn group_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completo_only_when_every_pairing_finished() {
        let units: Vec<UnitId> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut g = Group::new(Uuid::new_v4(), 2, units);
        assert_eq!(g.name, "Grupo C");
        assert_eq!(g.total_partidas, 6);
        for _ in 0..5 {
            g.record_finished();
        }
        assert!(!g.completo);
        g.record_finished();
        assert!(g.completo);
        g.record_finished();
        assert_eq!(g.partidas_finalizadas, 6);
        g.record_unfinished();
        assert!(!g.completo);
    }
}
