//! Elimination bracket nodes ("confrontos").

use crate::models::game::{MatchId, Score};
use crate::models::tournament::TournamentId;
use crate::models::unit::UnitId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a bracket node.
pub type NodeId = Uuid;

/// Elimination phase, ordered from the earliest to the final.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Oitavas,
    Quartas,
    Semifinal,
    Final,
}

impl Phase {
    /// Phase whose first round fits `n` entrants.
    pub fn for_entrants(n: usize) -> Phase {
        match n {
            0..=2 => Phase::Final,
            3..=4 => Phase::Semifinal,
            5..=8 => Phase::Quartas,
            _ => Phase::Oitavas,
        }
    }

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Oitavas => Some(Phase::Quartas),
            Phase::Quartas => Some(Phase::Semifinal),
            Phase::Semifinal => Some(Phase::Final),
            Phase::Final => None,
        }
    }

    /// Number of nodes in this phase of a full bracket.
    pub fn node_count(self) -> usize {
        match self {
            Phase::Oitavas => 8,
            Phase::Quartas => 4,
            Phase::Semifinal => 2,
            Phase::Final => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Oitavas => "Oitavas",
            Phase::Quartas => "Quartas",
            Phase::Semifinal => "Semifinal",
            Phase::Final => "Final",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Occupant of a bracket slot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", content = "valor", rename_all = "snake_case")]
pub enum Slot {
    Unit(UnitId),
    /// Not known yet; the text says where it will come from ("Vencedor Quartas 2").
    Origem(String),
    Bye,
}

impl Slot {
    pub fn unit(&self) -> Option<UnitId> {
        match self {
            Slot::Unit(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_bye(&self) -> bool {
        matches!(self, Slot::Bye)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Slot::Origem(_))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    Scheduled,
    Finished,
}

/// One elimination matchup.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketNode {
    pub id: NodeId,
    pub tournament_id: TournamentId,
    pub phase: Phase,
    /// 1-based position inside the phase. Nodes `2k-1` and `2k` feed node `k` of the next phase.
    pub ordem: u32,
    pub slot_a: Slot,
    pub slot_b: Slot,
    /// Display text for where each slot's occupant came from ("1º Grupo A", "Vencedor Oitavas 3").
    pub origem_a: String,
    pub origem_b: String,
    /// Node one phase up; None only for the final (or before the next phase exists).
    pub proximo_confronto_id: Option<NodeId>,
    pub is_bye: bool,
    pub status: NodeStatus,
    pub winner: Option<UnitId>,
    pub match_id: Option<MatchId>,
    pub score: Option<Score>,
}

impl BracketNode {
    pub fn new(tournament_id: TournamentId, phase: Phase, ordem: u32, slot_a: Slot, slot_b: Slot) -> Self {
        let origem_a = slot_label(&slot_a);
        let origem_b = slot_label(&slot_b);
        let is_bye = slot_a.is_bye() || slot_b.is_bye();
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            phase,
            ordem,
            slot_a,
            slot_b,
            origem_a,
            origem_b,
            proximo_confronto_id: None,
            is_bye,
            status: NodeStatus::Scheduled,
            winner: None,
            match_id: None,
            score: None,
        }
    }

    pub fn with_origins(mut self, origem_a: impl Into<String>, origem_b: impl Into<String>) -> Self {
        self.origem_a = origem_a.into();
        self.origem_b = origem_b.into();
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status == NodeStatus::Finished
    }

    /// Both slots hold concrete units, so a match can be played.
    pub fn is_playable(&self) -> bool {
        self.slot_a.unit().is_some() && self.slot_b.unit().is_some()
    }

    /// What this node sends to its successor once finished: the winner, or a BYE
    /// when both of its own slots were BYEs.
    pub fn advancing_slot(&self) -> Option<Slot> {
        if !self.is_finished() {
            return None;
        }
        Some(match self.winner {
            Some(w) => Slot::Unit(w),
            None => Slot::Bye,
        })
    }

    /// Display text for the winner of this node.
    pub fn winner_label(&self) -> String {
        format!("Vencedor {} {}", self.phase, self.ordem)
    }

    pub fn refresh_bye_flag(&mut self) {
        self.is_bye = self.slot_a.is_bye() || self.slot_b.is_bye();
    }
}

fn slot_label(slot: &Slot) -> String {
    match slot {
        Slot::Unit(_) => String::new(),
        Slot::Origem(s) => s.clone(),
        Slot::Bye => "BYE".to_string(),
    }
}
