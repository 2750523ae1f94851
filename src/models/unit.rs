//! Competitive units (duos or teams) and their cumulative statistics.

use crate::error::{TournamentError, TournamentResult};
use crate::models::group::GroupId;
use crate::models::player::PlayerId;
use crate::models::tournament::TournamentId;
use serde::{Deserialize, Serialize};
use std::ops::Neg;
use uuid::Uuid;

/// Unique identifier for a duo or a team.
pub type UnitId = Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Dupla,
    Equipe,
}

/// Cumulative statistics of a unit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub jogos: u32,
    pub vitorias: u32,
    pub derrotas: u32,
    pub pontos: i32,
    pub sets_vencidos: u32,
    pub sets_perdidos: u32,
    pub games_vencidos: u32,
    pub games_perdidos: u32,
}

impl UnitStats {
    pub fn saldo_sets(&self) -> i32 {
        self.sets_vencidos as i32 - self.sets_perdidos as i32
    }

    pub fn saldo_games(&self) -> i32 {
        self.games_vencidos as i32 - self.games_perdidos as i32
    }

    /// Apply a relative change. Counters never go below zero; returns true when
    /// some counter had to be clamped, meaning the delta removed more than was recorded.
    pub fn apply(&mut self, d: &StatsDelta) -> bool {
        let mut clamped = false;
        let mut shift = |v: u32, by: i32| -> u32 {
            let next = i64::from(v) + i64::from(by);
            clamped |= next < 0;
            u32::try_from(next.max(0)).unwrap_or(u32::MAX)
        };
        self.jogos = shift(self.jogos, d.jogos);
        self.vitorias = shift(self.vitorias, d.vitorias);
        self.derrotas = shift(self.derrotas, d.derrotas);
        self.sets_vencidos = shift(self.sets_vencidos, d.sets_vencidos);
        self.sets_perdidos = shift(self.sets_perdidos, d.sets_perdidos);
        self.games_vencidos = shift(self.games_vencidos, d.games_vencidos);
        self.games_perdidos = shift(self.games_perdidos, d.games_perdidos);
        self.pontos = self.pontos.saturating_add(d.pontos);
        clamped
    }
}

/// A signed change to a unit's statistics.
///
/// Result registration adds deltas and result reversal subtracts them; stats are
/// never overwritten wholesale.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub jogos: i32,
    pub vitorias: i32,
    pub derrotas: i32,
    pub pontos: i32,
    pub sets_vencidos: i32,
    pub sets_perdidos: i32,
    pub games_vencidos: i32,
    pub games_perdidos: i32,
}

impl StatsDelta {
    pub fn is_zero(&self) -> bool {
        *self == StatsDelta::default()
    }

    pub fn plus(self, o: StatsDelta) -> StatsDelta {
        StatsDelta {
            jogos: self.jogos + o.jogos,
            vitorias: self.vitorias + o.vitorias,
            derrotas: self.derrotas + o.derrotas,
            pontos: self.pontos + o.pontos,
            sets_vencidos: self.sets_vencidos + o.sets_vencidos,
            sets_perdidos: self.sets_perdidos + o.sets_perdidos,
            games_vencidos: self.games_vencidos + o.games_vencidos,
            games_perdidos: self.games_perdidos + o.games_perdidos,
        }
    }
}

impl Neg for StatsDelta {
    type Output = StatsDelta;

    fn neg(self) -> StatsDelta {
        StatsDelta {
            jogos: -self.jogos,
            vitorias: -self.vitorias,
            derrotas: -self.derrotas,
            pontos: -self.pontos,
            sets_vencidos: -self.sets_vencidos,
            sets_perdidos: -self.sets_perdidos,
            games_vencidos: -self.games_vencidos,
            games_perdidos: -self.games_perdidos,
        }
    }
}

/// A duo ("dupla") or a team ("equipe").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveUnit {
    pub id: UnitId,
    pub tournament_id: TournamentId,
    pub kind: UnitKind,
    pub name: String,
    pub members: Vec<PlayerId>,
    /// Protected seed: a duo containing a cabeça de chave, or a team flagged as one.
    pub cabeca_de_chave: bool,
    pub group_id: Option<GroupId>,
    pub stats: UnitStats,
    /// Final rank inside the group; None until the group is complete.
    pub posicao_grupo: Option<u32>,
    pub classificada: bool,
}

impl CompetitiveUnit {
    pub fn new(
        tournament_id: TournamentId,
        kind: UnitKind,
        name: impl Into<String>,
        members: Vec<PlayerId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            kind,
            name: name.into(),
            members,
            cabeca_de_chave: false,
            group_id: None,
            stats: UnitStats::default(),
            posicao_grupo: None,
            classificada: false,
        }
    }

    /// Put the unit in a group. A qualified unit cannot be moved.
    pub fn assign_group(&mut self, group: GroupId) -> TournamentResult<()> {
        if self.classificada && self.group_id != Some(group) {
            return Err(TournamentError::validation(format!(
                "{} already qualified from its group and cannot be regrouped",
                self.name
            )));
        }
        self.group_id = Some(group);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_then_add_nets_to_zero() {
        let d = StatsDelta {
            jogos: 1,
            vitorias: 1,
            pontos: 3,
            sets_vencidos: 2,
            games_vencidos: 12,
            games_perdidos: 5,
            ..Default::default()
        };
        let mut s = UnitStats::default();
        assert!(!s.apply(&d));
        let before = s;
        assert!(!s.apply(&-d));
        s.apply(&d);
        assert_eq!(s, before);
        assert_eq!(s.saldo_games(), 7);
        assert!((d.plus(-d)).is_zero());
    }

    #[test]
    fn removing_more_than_recorded_is_reported() {
        let mut s = UnitStats::default();
        let d = StatsDelta { jogos: 1, derrotas: 1, ..Default::default() };
        assert!(s.apply(&-d));
        assert_eq!(s.jogos, 0);
        assert_eq!(s.derrotas, 0);
    }

    #[test]
    fn qualified_unit_cannot_change_group() {
        let mut u = CompetitiveUnit::new(Uuid::new_v4(), UnitKind::Dupla, "X", vec![]);
        let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
        u.assign_group(g1).unwrap();
        u.classificada = true;
        assert!(u.assign_group(g1).is_ok());
        assert!(u.assign_group(g2).is_err());
    }
}
