//! Ranking points: a fixed table keyed by how far a unit went.

use crate::models::{BracketNode, CompetitiveUnit, Phase, UnitId};
use serde::{Deserialize, Serialize};

/// Where a unit's tournament ended.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStage {
    Campeao,
    Vice,
    Semifinal,
    Quartas,
    Oitavas,
    Grupos,
}

impl ExitStage {
    fn eliminated_in(phase: Phase) -> ExitStage {
        match phase {
            Phase::Oitavas => ExitStage::Oitavas,
            Phase::Quartas => ExitStage::Quartas,
            Phase::Semifinal => ExitStage::Semifinal,
            Phase::Final => ExitStage::Vice,
        }
    }
}

pub fn ranking_points(stage: ExitStage) -> u32 {
    match stage {
        ExitStage::Campeao => 100,
        ExitStage::Vice => 70,
        ExitStage::Semifinal => 50,
        ExitStage::Quartas => 30,
        ExitStage::Oitavas => 20,
        ExitStage::Grupos => 10,
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRow {
    pub unit_id: UnitId,
    pub name: String,
    pub exit: ExitStage,
    pub pontos: u32,
}

/// Exit stage of `unit` given the bracket's played nodes.
pub fn exit_stage(unit: UnitId, nodes: &[BracketNode]) -> ExitStage {
    let mut exit = ExitStage::Grupos;
    for n in nodes.iter().filter(|n| n.is_finished()) {
        let in_node = n.slot_a.unit() == Some(unit) || n.slot_b.unit() == Some(unit);
        if !in_node {
            continue;
        }
        let stage = match n.winner {
            Some(w) if w == unit && n.phase == Phase::Final => ExitStage::Campeao,
            Some(w) if w == unit => continue,
            _ => ExitStage::eliminated_in(n.phase),
        };
        exit = exit.min(stage);
    }
    exit
}

/// Every unit with its exit stage and points, best first.
pub fn final_classification(units: &[CompetitiveUnit], nodes: &[BracketNode]) -> Vec<ClassificationRow> {
    let mut rows: Vec<ClassificationRow> = units
        .iter()
        .map(|u| {
            let exit = exit_stage(u.id, nodes);
            ClassificationRow {
                unit_id: u.id,
                name: u.name.clone(),
                exit,
                pontos: ranking_points(exit),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.exit.cmp(&b.exit).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeStatus, Slot};
    use uuid::Uuid;

    fn played(phase: Phase, a: UnitId, b: UnitId, winner: UnitId) -> BracketNode {
        let mut n = BracketNode::new(Uuid::new_v4(), phase, 1, Slot::Unit(a), Slot::Unit(b));
        n.status = NodeStatus::Finished;
        n.winner = Some(winner);
        n
    }

    #[test]
    fn exit_stages_follow_the_bracket() {
        let u: Vec<UnitId> = (0..5).map(|_| Uuid::new_v4()).collect();
        let nodes = vec![
            played(Phase::Semifinal, u[0], u[1], u[0]),
            played(Phase::Semifinal, u[2], u[3], u[2]),
            played(Phase::Final, u[0], u[2], u[2]),
        ];
        assert_eq!(exit_stage(u[2], &nodes), ExitStage::Campeao);
        assert_eq!(exit_stage(u[0], &nodes), ExitStage::Vice);
        assert_eq!(exit_stage(u[1], &nodes), ExitStage::Semifinal);
        assert_eq!(exit_stage(u[4], &nodes), ExitStage::Grupos);
        assert_eq!(ranking_points(ExitStage::Campeao), 100);
    }
}
