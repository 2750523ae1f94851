//! Bracket progression.
//!
//! Each node moves SCHEDULED -> FINISHED when a result is recorded (or at once when a
//! slot is a BYE). When every node of a phase is finished, the winners are collected in
//! ascending `ordem` and either create the next phase (first time) or are diffed against
//! the next phase's current slots. A changed slot resets that node: its result and match
//! are dropped and the operator re-enters it. Resets do not travel past that phase.

use crate::error::{TournamentError, TournamentResult};
use crate::models::{
    BracketNode, MatchId, NodeId, NodeStatus, Phase, Score, Side, Slot, TournamentId,
    TournamentStage, UnitId,
};
use std::collections::{BTreeSet, HashMap};

/// Something that happened to a bracket node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeEvent {
    /// A score was recorded (or edited) for the node's match.
    ResultRecorded { node_id: NodeId, score: Score },
}

/// A node whose slot changed under it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeReset {
    pub node_id: NodeId,
    /// Match that belonged to the old pairing; the caller deletes it.
    pub match_id: Option<MatchId>,
    /// The node had a recorded result, whose statistics the caller reverses.
    pub was_finished: bool,
}

/// Everything a call changed, for the caller to persist.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Advancement {
    /// Ids of existing nodes that changed.
    pub updated: BTreeSet<NodeId>,
    /// Ids of nodes created by this call.
    pub created: BTreeSet<NodeId>,
    pub resets: Vec<NodeReset>,
    /// Phases that became complete, in order.
    pub completed_phases: Vec<Phase>,
    pub champion: Option<UnitId>,
}

impl Advancement {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.created.is_empty() && self.resets.is_empty()
    }
}

/// In-memory view of one tournament's bracket that events are applied to.
#[derive(Clone, Debug)]
pub struct BracketState {
    tournament_id: TournamentId,
    nodes: Vec<BracketNode>,
}

impl BracketState {
    pub fn new(tournament_id: TournamentId, nodes: Vec<BracketNode>) -> Self {
        Self { tournament_id, nodes }
    }

    pub fn nodes(&self) -> &[BracketNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<BracketNode> {
        self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&BracketNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut BracketNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Nodes of `phase` in ascending `ordem`.
    pub fn phase_nodes(&self, phase: Phase) -> Vec<&BracketNode> {
        let mut v: Vec<&BracketNode> = self.nodes.iter().filter(|n| n.phase == phase).collect();
        v.sort_by_key(|n| n.ordem);
        v
    }

    fn phase_ids(&self, phase: Phase) -> Vec<NodeId> {
        self.phase_nodes(phase).iter().map(|n| n.id).collect()
    }

    pub fn first_phase(&self) -> Option<Phase> {
        self.nodes.iter().map(|n| n.phase).min()
    }

    pub fn is_phase_complete(&self, phase: Phase) -> bool {
        let nodes = self.phase_nodes(phase);
        !nodes.is_empty() && nodes.iter().all(|n| n.is_finished())
    }

    /// Winner of the final, once it is played.
    pub fn champion(&self) -> Option<UnitId> {
        self.phase_nodes(Phase::Final)
            .first()
            .filter(|n| n.is_finished())
            .and_then(|n| n.winner)
    }

    /// Lifecycle stage implied by the bracket: the earliest phase still being played.
    pub fn stage(&self) -> TournamentStage {
        let open = self
            .nodes
            .iter()
            .filter(|n| !n.is_finished())
            .map(|n| n.phase)
            .min();
        match open {
            Some(phase) => TournamentStage::from_phase(phase),
            None if self.champion().is_some() => TournamentStage::Finalizada,
            None => self
                .nodes
                .iter()
                .map(|n| n.phase)
                .max()
                .map_or(TournamentStage::Grupos, TournamentStage::from_phase),
        }
    }

    /// Finish BYE nodes of the first phase and carry them forward. Called once after the
    /// bracket is generated.
    pub fn start(&mut self) -> Advancement {
        let mut out = Advancement::default();
        if let Some(phase) = self.first_phase() {
            self.cascade(phase, &mut out);
        }
        out
    }

    /// Apply an event and run the cascade.
    pub fn apply(&mut self, event: NodeEvent) -> TournamentResult<Advancement> {
        let mut out = Advancement::default();
        match event {
            NodeEvent::ResultRecorded { node_id, score } => {
                score.validate()?;
                let node = self
                    .node_mut(node_id)
                    .ok_or_else(|| TournamentError::not_found("bracket node", node_id))?;
                let (Some(a), Some(b)) = (node.slot_a.unit(), node.slot_b.unit()) else {
                    return Err(TournamentError::validation(format!(
                        "{} {} does not have two units yet",
                        node.phase, node.ordem
                    )));
                };
                let winner = match score.winner() {
                    Some(Side::A) => a,
                    Some(Side::B) => b,
                    None => return Err(TournamentError::validation("Score has no winner")),
                };
                let unchanged = node.is_finished() && node.score.as_ref() == Some(&score);
                node.status = NodeStatus::Finished;
                node.winner = Some(winner);
                node.score = Some(score);
                let phase = node.phase;
                if !unchanged {
                    out.updated.insert(node_id);
                }
                self.cascade(phase, &mut out);
            }
        }
        Ok(out)
    }

    /// Finish every BYE node of `phase` whose slots are both known.
    fn finish_byes(&mut self, phase: Phase, out: &mut Advancement) {
        for node in self.nodes.iter_mut().filter(|n| n.phase == phase) {
            if node.is_finished() || !node.is_bye {
                continue;
            }
            if !(node.slot_a.is_resolved() && node.slot_b.is_resolved()) {
                continue;
            }
            node.winner = node.slot_a.unit().or_else(|| node.slot_b.unit());
            node.status = NodeStatus::Finished;
            if !out.created.contains(&node.id) {
                out.updated.insert(node.id);
            }
        }
    }

    fn cascade(&mut self, from: Phase, out: &mut Advancement) {
        let mut phase = from;
        loop {
            self.finish_byes(phase, out);
            if !self.is_phase_complete(phase) {
                break;
            }
            if !out.completed_phases.contains(&phase) {
                out.completed_phases.push(phase);
            }
            let Some(next) = phase.next() else {
                out.champion = self.champion();
                break;
            };

            let feeders = self.phase_ids(phase);
            let incoming: Vec<(Slot, String)> = self
                .phase_nodes(phase)
                .iter()
                .map(|n| (n.advancing_slot().unwrap_or(Slot::Bye), n.winner_label()))
                .collect();

            if self.phase_nodes(next).is_empty() {
                self.create_phase(next, &feeders, incoming, out);
            } else {
                self.sync_phase(next, incoming, out);
            }
            phase = next;
        }
    }

    fn create_phase(
        &mut self,
        next: Phase,
        feeders: &[NodeId],
        incoming: Vec<(Slot, String)>,
        out: &mut Advancement,
    ) {
        let mut created = Vec::with_capacity(incoming.len() / 2);
        for (k, pair) in incoming.chunks(2).enumerate() {
            let (slot_a, label_a) = pair[0].clone();
            let (slot_b, label_b) = pair
                .get(1)
                .cloned()
                .unwrap_or((Slot::Bye, "BYE".to_string()));
            let node = BracketNode::new(self.tournament_id, next, k as u32 + 1, slot_a, slot_b)
                .with_origins(label_a, label_b);
            for &feeder in &feeders[2 * k..(2 * k + 2).min(feeders.len())] {
                if let Some(f) = self.node_mut(feeder) {
                    f.proximo_confronto_id = Some(node.id);
                    out.updated.insert(feeder);
                }
            }
            out.created.insert(node.id);
            created.push(node);
        }
        log::info!("Created {} node(s) for {}", created.len(), next);
        self.nodes.extend(created);
    }

    fn sync_phase(&mut self, next: Phase, incoming: Vec<(Slot, String)>, out: &mut Advancement) {
        for (k, id) in self.phase_ids(next).into_iter().enumerate() {
            let expected_a = incoming.get(2 * k).map(|(s, _)| s.clone());
            let expected_b = incoming.get(2 * k + 1).map(|(s, _)| s.clone());
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            let mut changed = false;
            if let Some(a) = expected_a {
                if node.slot_a != a {
                    log::debug!("{} {} slot A: {:?} -> {:?}", node.phase, node.ordem, node.slot_a, a);
                    node.slot_a = a;
                    changed = true;
                }
            }
            if let Some(b) = expected_b {
                if node.slot_b != b {
                    log::debug!("{} {} slot B: {:?} -> {:?}", node.phase, node.ordem, node.slot_b, b);
                    node.slot_b = b;
                    changed = true;
                }
            }
            if !changed {
                continue;
            }
            node.refresh_bye_flag();
            let was_finished = node.is_finished();
            let match_id = node.match_id.take();
            if was_finished || match_id.is_some() {
                node.status = NodeStatus::Scheduled;
                node.winner = None;
                node.score = None;
                out.resets.push(NodeReset {
                    node_id: id,
                    match_id,
                    was_finished,
                });
            }
            if !out.created.contains(&id) {
                out.updated.insert(id);
            }
        }
        self.finish_byes(next, out);
    }
}

/// Check the successor structure: every non-final node points to a node of the next
/// phase, and each node after the first phase is fed by exactly two nodes. Phases whose
/// successor phase does not exist yet are skipped.
pub fn check_successors(nodes: &[BracketNode]) -> TournamentResult<()> {
    let by_id: HashMap<NodeId, &BracketNode> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut fed: HashMap<NodeId, usize> = HashMap::new();
    for n in nodes {
        let Some(next) = n.phase.next() else { continue };
        if !nodes.iter().any(|x| x.phase == next) {
            continue;
        }
        let target = n
            .proximo_confronto_id
            .and_then(|id| by_id.get(&id))
            .ok_or_else(|| {
                TournamentError::validation(format!("{} {} has no successor", n.phase, n.ordem))
            })?;
        if target.phase != next {
            return Err(TournamentError::validation(format!(
                "{} {} points to {} instead of {}",
                n.phase, n.ordem, target.phase, next
            )));
        }
        *fed.entry(target.id).or_default() += 1;
    }

    let Some(first) = nodes.iter().map(|n| n.phase).min() else {
        return Ok(());
    };
    for n in nodes.iter().filter(|n| n.phase > first) {
        let count = fed.get(&n.id).copied().unwrap_or(0);
        if count != 2 {
            return Err(TournamentError::validation(format!(
                "{} {} is fed by {} node(s)",
                n.phase, n.ordem, count
            )));
        }
    }
    Ok(())
}
