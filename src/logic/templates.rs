//! Fixed bracket layouts for the team format (2 to 8 groups, top two of each group qualify).
//!
//! Every layout is a full 16-slot bracket: 8 round-of-16 nodes, 4 quarterfinals,
//! 2 semifinals and the final. Missing entrants are BYEs, placed so the best first
//! places skip ahead and the two qualifiers of a group sit in opposite halves.

use crate::error::{TournamentError, TournamentResult};
use crate::models::{group_letter, BracketNode, Phase, Slot, TournamentId, UnitId};
use std::collections::BTreeMap;

/// Occupant of a round-of-16 slot in a layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemplateSlot {
    /// `posicao`-th place of group `group` (0-based, `A` = 0).
    Seed { posicao: u32, group: usize },
    Bye,
}

impl TemplateSlot {
    pub fn label(self) -> String {
        match self {
            TemplateSlot::Seed { posicao, group } => format!("{}º Grupo {}", posicao, group_letter(group)),
            TemplateSlot::Bye => "BYE".to_string(),
        }
    }
}

/// A bracket layout: the eight round-of-16 pairings, in `ordem` order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BracketTemplate {
    pub group_count: usize,
    pub oitavas: [(TemplateSlot, TemplateSlot); 8],
}

impl BracketTemplate {
    /// Number of BYE slots in the round of 16.
    pub fn bye_count(&self) -> usize {
        self.oitavas
            .iter()
            .flat_map(|(a, b)| [a, b])
            .filter(|s| **s == TemplateSlot::Bye)
            .count()
    }
}

const B: TemplateSlot = TemplateSlot::Bye;

const fn s(posicao: u32, letter: u8) -> TemplateSlot {
    TemplateSlot::Seed {
        posicao,
        group: (letter - b'A') as usize,
    }
}

static TEMPLATES: [BracketTemplate; 7] = [
    BracketTemplate {
        group_count: 2,
        oitavas: [
            (s(1, b'A'), B),
            (B, B),
            (B, B),
            (s(2, b'B'), B),
            (s(1, b'B'), B),
            (B, B),
            (B, B),
            (s(2, b'A'), B),
        ],
    },
    BracketTemplate {
        group_count: 3,
        oitavas: [
            (s(1, b'A'), B),
            (B, B),
            (s(1, b'C'), B),
            (s(2, b'B'), B),
            (s(1, b'B'), B),
            (B, B),
            (s(2, b'A'), B),
            (s(2, b'C'), B),
        ],
    },
    BracketTemplate {
        group_count: 4,
        oitavas: [
            (s(1, b'A'), B),
            (s(2, b'B'), B),
            (s(1, b'C'), B),
            (s(2, b'D'), B),
            (s(1, b'B'), B),
            (s(2, b'A'), B),
            (s(1, b'D'), B),
            (s(2, b'C'), B),
        ],
    },
    BracketTemplate {
        group_count: 5,
        oitavas: [
            (s(1, b'A'), B),
            (s(2, b'B'), s(2, b'D')),
            (s(1, b'C'), B),
            (s(1, b'E'), B),
            (s(1, b'B'), B),
            (s(2, b'C'), s(2, b'E')),
            (s(1, b'D'), B),
            (s(2, b'A'), B),
        ],
    },
    BracketTemplate {
        group_count: 6,
        oitavas: [
            (s(1, b'A'), B),
            (s(1, b'F'), s(2, b'E')),
            (s(1, b'C'), B),
            (s(2, b'D'), s(2, b'B')),
            (s(1, b'B'), B),
            (s(1, b'E'), s(2, b'F')),
            (s(1, b'D'), B),
            (s(2, b'C'), s(2, b'A')),
        ],
    },
    BracketTemplate {
        group_count: 7,
        oitavas: [
            (s(1, b'A'), B),
            (s(1, b'C'), s(2, b'D')),
            (s(1, b'E'), s(2, b'F')),
            (s(1, b'G'), s(2, b'B')),
            (s(1, b'B'), B),
            (s(1, b'D'), s(2, b'C')),
            (s(1, b'F'), s(2, b'E')),
            (s(2, b'G'), s(2, b'A')),
        ],
    },
    BracketTemplate {
        group_count: 8,
        oitavas: [
            (s(1, b'A'), s(2, b'B')),
            (s(1, b'C'), s(2, b'D')),
            (s(1, b'E'), s(2, b'F')),
            (s(1, b'G'), s(2, b'H')),
            (s(1, b'B'), s(2, b'A')),
            (s(1, b'D'), s(2, b'C')),
            (s(1, b'F'), s(2, b'E')),
            (s(1, b'H'), s(2, b'G')),
        ],
    },
];

/// Layout for `group_count` groups.
pub fn template_for(group_count: usize) -> Option<&'static BracketTemplate> {
    TEMPLATES.iter().find(|t| t.group_count == group_count)
}

/// Every layout keyed by group count.
pub fn templates() -> BTreeMap<usize, &'static BracketTemplate> {
    TEMPLATES.iter().map(|t| (t.group_count, t)).collect()
}

/// Build all 15 nodes of the team bracket, top-down: final, semifinals, quarterfinals,
/// round of 16. `lookup(posicao, group_index)` resolves a qualifier to its unit.
///
/// Returned in phase order (round of 16 first), `ordem` ascending inside each phase.
pub fn generate_template_bracket(
    tournament_id: TournamentId,
    group_count: usize,
    lookup: impl Fn(u32, usize) -> Option<UnitId>,
) -> TournamentResult<Vec<BracketNode>> {
    let template = template_for(group_count).ok_or_else(|| {
        TournamentError::validation(format!(
            "No bracket layout for {group_count} groups (supported: 2 to 8)"
        ))
    })?;

    let winner_of = |phase: Phase, ordem: u32| Slot::Origem(format!("Vencedor {phase} {ordem}"));

    let final_node = BracketNode::new(
        tournament_id,
        Phase::Final,
        1,
        winner_of(Phase::Semifinal, 1),
        winner_of(Phase::Semifinal, 2),
    );

    let mut upper: Vec<BracketNode> = vec![final_node];
    let mut all: Vec<Vec<BracketNode>> = Vec::new();
    for phase in [Phase::Semifinal, Phase::Quartas] {
        let feeder = phase_before(phase);
        let nodes: Vec<BracketNode> = (1..=phase.node_count() as u32)
            .map(|ordem| {
                let mut n = BracketNode::new(
                    tournament_id,
                    phase,
                    ordem,
                    winner_of(feeder, 2 * ordem - 1),
                    winner_of(feeder, 2 * ordem),
                );
                n.proximo_confronto_id = Some(upper[((ordem - 1) / 2) as usize].id);
                n
            })
            .collect();
        all.push(std::mem::replace(&mut upper, nodes));
    }

    let mut oitavas = Vec::with_capacity(8);
    for (i, &(a, b)) in template.oitavas.iter().enumerate() {
        let ordem = i as u32 + 1;
        let resolve = |t: TemplateSlot| -> TournamentResult<Slot> {
            match t {
                TemplateSlot::Bye => Ok(Slot::Bye),
                TemplateSlot::Seed { posicao, group } => lookup(posicao, group).map(Slot::Unit).ok_or_else(|| {
                    TournamentError::validation(format!("Missing qualifier {}", t.label()))
                }),
            }
        };
        let mut n = BracketNode::new(tournament_id, Phase::Oitavas, ordem, resolve(a)?, resolve(b)?)
            .with_origins(a.label(), b.label());
        n.proximo_confronto_id = Some(upper[i / 2].id);
        oitavas.push(n);
    }
    all.push(upper);
    all.push(oitavas);

    // all = [final, semis, quartas, oitavas]
    Ok(all.into_iter().rev().flatten().collect())
}

fn phase_before(phase: Phase) -> Phase {
    match phase {
        Phase::Final => Phase::Semifinal,
        Phase::Semifinal => Phase::Quartas,
        Phase::Quartas | Phase::Oitavas => Phase::Oitavas,
    }
}
