//! Compensation journal: records every write of a multi-step operation so a failure
//! part-way through can be undone.

use crate::models::{
    BracketNode, GroupId, Match, MatchId, NodeId, Scope, StatsDelta, TournamentStage, UnitId,
};
use crate::repository::Store;

#[derive(Default)]
pub(crate) struct Journal {
    pub created_units: Vec<UnitId>,
    pub created_groups: Vec<GroupId>,
    pub created_matches: Vec<MatchId>,
    pub created_nodes: Vec<NodeId>,
    /// Matches deleted by the operation, to re-insert.
    pub deleted_matches: Vec<Match>,
    /// Matches as they were before their result was overwritten.
    pub match_snapshots: Vec<Match>,
    /// Nodes as they were before being updated.
    pub node_snapshots: Vec<BracketNode>,
    pub deltas: Vec<(UnitId, StatsDelta)>,
    pub group_progress: Vec<(GroupId, i32)>,
    /// Group positions before they were recomputed.
    pub ranks: Vec<(UnitId, Option<u32>)>,
    pub classified: Vec<UnitId>,
    pub pairs_appended: bool,
    pub previous_stage: Option<TournamentStage>,
}

impl Journal {
    pub fn snapshot_node(&mut self, node: &BracketNode) {
        if !self.node_snapshots.iter().any(|n| n.id == node.id) {
            self.node_snapshots.push(node.clone());
        }
    }

    pub fn snapshot_match(&mut self, m: &Match) {
        if !self.match_snapshots.iter().any(|x| x.id == m.id) {
            self.match_snapshots.push(m.clone());
        }
    }

    /// Undo everything recorded, newest effects first. Failures are logged and skipped so
    /// the rest of the compensation still runs.
    pub async fn rollback<S: Store + ?Sized>(self, store: &S, scope: Scope) {
        log::warn!("Rolling back partial operation on tournament {}", scope.etapa_id);

        if let Some(stage) = self.previous_stage {
            if let Err(e) = store.update_stage(scope, stage).await {
                log::error!("rollback: restoring stage failed: {e}");
            }
        }
        for (unit, delta) in self.deltas.iter().rev() {
            if let Err(e) = store.apply_stats_delta(scope, *unit, &-*delta).await {
                log::error!("rollback: reversing stats of {unit} failed: {e}");
            }
        }
        for (group, delta) in self.group_progress.iter().rev() {
            if let Err(e) = store.update_group_progress(scope, *group, -*delta).await {
                log::error!("rollback: group progress of {group} failed: {e}");
            }
        }
        for (unit, posicao) in self.ranks.iter().rev() {
            if let Err(e) = store.set_group_rank(scope, *unit, *posicao).await {
                log::error!("rollback: restoring position of {unit} failed: {e}");
            }
        }
        for m in &self.match_snapshots {
            if let Err(e) = store
                .save_result(scope, m.id, m.score.clone(), m.status, m.finished_at)
                .await
            {
                log::error!("rollback: restoring match {} failed: {e}", m.id);
            }
        }
        for n in &self.node_snapshots {
            if let Err(e) = store.update_node(scope, n).await {
                log::error!("rollback: restoring node {} failed: {e}", n.id);
            }
        }
        if !self.deleted_matches.is_empty() {
            if let Err(e) = store.bulk_create_matches(scope, &self.deleted_matches).await {
                log::error!("rollback: re-inserting matches failed: {e}");
            }
        }
        if !self.classified.is_empty() {
            if let Err(e) = store.set_classificada(scope, &self.classified, false).await {
                log::error!("rollback: clearing qualification failed: {e}");
            }
        }
        if self.pairs_appended {
            if let Err(e) = store.remove_pairs(scope).await {
                log::error!("rollback: removing partner history failed: {e}");
            }
        }
        let deletes = [
            ("nodes", store.delete_nodes(scope, &self.created_nodes).await),
            ("matches", store.delete_matches(scope, &self.created_matches).await),
            ("groups", store.delete_groups(scope, &self.created_groups).await),
            ("units", store.delete_units(scope, &self.created_units).await),
        ];
        for (what, res) in deletes {
            if let Err(e) = res {
                log::error!("rollback: deleting created {what} failed: {e}");
            }
        }
    }
}
