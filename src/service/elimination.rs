//! Elimination stage: bracket generation, result recording with progression, and the
//! two cancellation paths.

use super::journal::Journal;
use super::{net_deltas, TournamentService};
use crate::error::{TournamentError, TournamentResult};
use crate::logic::{
    check_successors, first_round_nodes, generate_template_bracket, order_qualifiers,
    seed_bracket, Advancement, BracketState, NodeEvent, Qualifier,
};
use crate::models::{
    BracketNode, Match, MatchId, MatchKind, MatchStatus, NodeId, Score, Scope, Tournament,
    TournamentFormat, TournamentStage, UnitId,
};
use crate::repository::Store;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// What recording a result changed.
#[derive(Clone, Debug, Serialize)]
pub struct ResultOutcome {
    pub partida: Match,
    pub stage: TournamentStage,
    /// The submitted score equals the stored one; nothing was written.
    pub unchanged: bool,
    /// Group matches only: the group has every match played.
    pub group_completo: Option<bool>,
    pub nodes_created: usize,
    /// Downstream nodes whose pairing changed and lost their result.
    pub nodes_reset: usize,
    pub champion: Option<UnitId>,
}

impl ResultOutcome {
    fn new(partida: Match, stage: TournamentStage) -> Self {
        Self {
            partida,
            stage,
            unchanged: false,
            group_completo: None,
            nodes_created: 0,
            nodes_reset: 0,
            champion: None,
        }
    }
}

/// Give every playable node without a match a fresh scheduled one.
fn schedule_playable<'a>(
    nodes: impl Iterator<Item = &'a mut BracketNode>,
) -> Vec<Match> {
    let mut matches = Vec::new();
    for node in nodes {
        if !node.is_playable() || node.match_id.is_some() {
            continue;
        }
        let (Some(a), Some(b)) = (node.slot_a.unit(), node.slot_b.unit()) else {
            continue;
        };
        let m = Match::new(
            node.tournament_id,
            MatchKind::Eliminatoria {
                node_id: node.id,
                phase: node.phase,
            },
            a,
            b,
        );
        node.match_id = Some(m.id);
        matches.push(m);
    }
    matches
}

impl<S: Store> TournamentService<S> {
    /// Record or edit the result of any match. Group matches update statistics and
    /// positions; elimination matches also advance the bracket.
    pub async fn record_match_result(
        &self,
        scope: Scope,
        match_id: MatchId,
        score: Score,
    ) -> TournamentResult<ResultOutcome> {
        score.validate()?;
        let _guard = self.lock(scope.etapa_id).await;
        let t = self.load(scope).await?;
        let m = self
            .store
            .get_match(scope, match_id)
            .await?
            .ok_or_else(|| TournamentError::not_found("match", match_id))?;

        if m.is_finished() && m.score.as_ref() == Some(&score) {
            log::debug!("Match {match_id}: same score resubmitted, nothing to do");
            let mut out = ResultOutcome::new(m, t.stage);
            out.unchanged = true;
            return Ok(out);
        }

        let mut journal = Journal::default();
        let result = match m.kind {
            MatchKind::Grupo { .. } => self
                .record_group_result(&t, &m, score, &mut journal)
                .await
                .map(|(partida, completo)| {
                    let stage = if t.stage == TournamentStage::ChavesGeradas {
                        TournamentStage::Grupos
                    } else {
                        t.stage
                    };
                    let mut out = ResultOutcome::new(partida, stage);
                    out.group_completo = Some(completo);
                    out
                }),
            MatchKind::Eliminatoria { node_id, .. } => {
                self.record_elimination_result(&t, &m, node_id, score, &mut journal)
                    .await
            }
        };
        self.settle(scope, journal, result).await
    }

    async fn record_elimination_result(
        &self,
        t: &Tournament,
        m: &Match,
        node_id: NodeId,
        score: Score,
        journal: &mut Journal,
    ) -> TournamentResult<ResultOutcome> {
        let scope = t.scope();
        if !(t.stage.is_elimination() || t.stage == TournamentStage::Finalizada) {
            return Err(TournamentError::validation(format!(
                "Tournament is in stage {:?}; no elimination match can be played",
                t.stage
            )));
        }
        let before: Vec<BracketNode> = self.store.list_nodes(scope, None).await?;
        let original = before
            .iter()
            .find(|n| n.id == node_id)
            .cloned()
            .ok_or_else(|| TournamentError::not_found("bracket node", node_id))?;
        if original.match_id != Some(m.id) {
            return Err(TournamentError::Conflict(format!(
                "Match {} no longer belongs to {} {}",
                m.id, original.phase, original.ordem
            )));
        }

        let mut state = BracketState::new(t.id, before.clone());
        let adv = state.apply(NodeEvent::ResultRecorded {
            node_id,
            score: score.clone(),
        })?;
        let stage = state.stage();
        let champion = state.champion();
        let mut nodes = state.into_nodes();

        // The match itself and its statistics.
        let mut partida = m.clone();
        partida.score = Some(score);
        partida.status = MatchStatus::Finished;
        partida.finished_at = Some(Utc::now());
        journal.snapshot_match(m);
        self.store
            .save_result(scope, m.id, partida.score.clone(), partida.status, partida.finished_at)
            .await?;
        let points = t.points;
        let deltas = net_deltas(
            &m.stat_deltas(points.win, points.loss),
            &partida.stat_deltas(points.win, points.loss),
        );
        self.apply_deltas(scope, &deltas, journal).await?;

        // The node, only if nobody finished or reopened it since we read it.
        let recorded = nodes
            .iter()
            .find(|n| n.id == node_id)
            .cloned()
            .ok_or_else(|| TournamentError::not_found("bracket node", node_id))?;
        if !self
            .store
            .update_node_if_status(scope, &recorded, original.status)
            .await?
        {
            return Err(TournamentError::Conflict(format!(
                "{} {} was changed by another request",
                original.phase, original.ordem
            )));
        }
        journal.snapshot_node(&original);

        self.discard_reset_matches(t, &adv, journal).await?;

        let touched: BTreeSet<NodeId> = adv.updated.union(&adv.created).copied().collect();
        let new_matches = schedule_playable(nodes.iter_mut().filter(|n| touched.contains(&n.id)));
        self.persist_nodes(scope, &before, &nodes, &adv, node_id, journal)
            .await?;
        journal.created_matches.extend(new_matches.iter().map(|m| m.id));
        self.store.bulk_create_matches(scope, &new_matches).await?;

        self.set_stage(t, stage, journal).await?;
        for r in &adv.resets {
            log::info!("Node {} reset: its pairing changed", r.node_id);
        }
        if let Some(champion) = adv.champion {
            log::info!("{}: champion decided ({champion})", t.name);
        }

        let mut out = ResultOutcome::new(partida, stage);
        out.nodes_created = adv.created.len();
        out.nodes_reset = adv.resets.len();
        out.champion = champion;
        Ok(out)
    }

    /// Delete the matches of reset nodes, reversing their statistics if they were played.
    async fn discard_reset_matches(
        &self,
        t: &Tournament,
        adv: &Advancement,
        journal: &mut Journal,
    ) -> TournamentResult<()> {
        let scope = t.scope();
        let points = t.points;
        for reset in &adv.resets {
            let Some(match_id) = reset.match_id else {
                continue;
            };
            let Some(old) = self.store.get_match(scope, match_id).await? else {
                continue;
            };
            if old.is_finished() {
                let reversal = net_deltas(&old.stat_deltas(points.win, points.loss), &[]);
                self.apply_deltas(scope, &reversal, journal).await?;
            }
            journal.deleted_matches.push(old);
            self.store.delete_matches(scope, &[match_id]).await?;
        }
        Ok(())
    }

    /// Write created nodes and every changed node other than `skip` (already written).
    async fn persist_nodes(
        &self,
        scope: Scope,
        before: &[BracketNode],
        nodes: &[BracketNode],
        adv: &Advancement,
        skip: NodeId,
        journal: &mut Journal,
    ) -> TournamentResult<()> {
        let old: HashMap<NodeId, &BracketNode> = before.iter().map(|n| (n.id, n)).collect();
        let created: Vec<BracketNode> = nodes
            .iter()
            .filter(|n| adv.created.contains(&n.id))
            .cloned()
            .collect();
        journal.created_nodes.extend(created.iter().map(|n| n.id));
        self.store.bulk_create_nodes(scope, &created).await?;

        for node in nodes.iter().filter(|n| n.id != skip && old.contains_key(&n.id)) {
            let Some(prev) = old.get(&node.id) else {
                continue;
            };
            if *prev == node {
                continue;
            }
            journal.snapshot_node(prev);
            self.store.update_node(scope, node).await?;
        }
        Ok(())
    }

    /// Seed the qualifiers of every complete group into the elimination bracket.
    ///
    /// Duo tournaments take the top `qualifiers_per_group` of each group and use the
    /// generic seeder. Team tournaments take the top two and use the fixed layout for
    /// their group count. BYE nodes are finished straight away.
    pub async fn generate_elimination_bracket(
        &self,
        scope: Scope,
        qualifiers_per_group: usize,
    ) -> TournamentResult<Vec<BracketNode>> {
        let _guard = self.lock(scope.etapa_id).await;
        let t = self.load(scope).await?;
        if !t.stage.is_group_stage() {
            return Err(TournamentError::validation(format!(
                "Tournament is in stage {:?}; the bracket is generated after the group stage",
                t.stage
            )));
        }
        if !self.store.list_nodes(scope, None).await?.is_empty() {
            return Err(TournamentError::validation("The elimination bracket already exists"));
        }
        if qualifiers_per_group == 0 {
            return Err(TournamentError::validation("At least one unit per group must qualify"));
        }

        let mut groups = self.store.list_groups(scope).await?;
        groups.sort_by_key(|g| g.index);
        if groups.is_empty() {
            return Err(TournamentError::validation("No groups formed yet"));
        }
        let open: Vec<&str> = groups
            .iter()
            .filter(|g| !g.completo)
            .map(|g| g.name.as_str())
            .collect();
        if !open.is_empty() {
            return Err(TournamentError::validation(format!(
                "Groups still in play: {}",
                open.join(", ")
            )));
        }

        let units = self.store.list_units(scope).await?;
        let mut qualifiers = Vec::new();
        for g in &groups {
            if g.units.len() < qualifiers_per_group {
                return Err(TournamentError::validation(format!(
                    "{} has only {} units; cannot qualify {}",
                    g.name,
                    g.units.len(),
                    qualifiers_per_group
                )));
            }
            for u in units.iter().filter(|u| u.group_id == Some(g.id)) {
                let posicao = u.posicao_grupo.ok_or_else(|| {
                    TournamentError::validation(format!("{} has no final position in {}", u.name, g.name))
                })?;
                if posicao as usize <= qualifiers_per_group {
                    qualifiers.push(Qualifier {
                        unit_id: u.id,
                        group_index: g.index,
                        posicao,
                        stats: u.stats,
                    });
                }
            }
        }

        let nodes = match t.format {
            TournamentFormat::Duplas => {
                let ordered = order_qualifiers(qualifiers.clone());
                let seeded = seed_bracket(&ordered)?;
                if seeded.bye_count() > 0 {
                    log::info!("{}: {} BYE(s) in {}", t.name, seeded.bye_count(), seeded.phase);
                }
                first_round_nodes(t.id, &ordered, &seeded)
            }
            TournamentFormat::Equipes => {
                if qualifiers_per_group != 2 {
                    return Err(TournamentError::validation(
                        "Team brackets take exactly two qualifiers per group",
                    ));
                }
                generate_template_bracket(t.id, groups.len(), |posicao, group_index| {
                    qualifiers
                        .iter()
                        .find(|q| q.posicao == posicao && q.group_index == group_index)
                        .map(|q| q.unit_id)
                })?
            }
        };

        let mut state = BracketState::new(t.id, nodes);
        state.start();
        let stage = state.stage();
        let mut nodes = state.into_nodes();
        check_successors(&nodes)?;
        let matches = schedule_playable(nodes.iter_mut());

        let mut journal = Journal::default();
        let classified: Vec<UnitId> = qualifiers.iter().map(|q| q.unit_id).collect();
        let result = async {
            journal.classified.extend(classified.iter().copied());
            self.store.set_classificada(scope, &classified, true).await?;
            journal.created_nodes.extend(nodes.iter().map(|n| n.id));
            self.store.bulk_create_nodes(scope, &nodes).await?;
            journal.created_matches.extend(matches.iter().map(|m| m.id));
            self.store.bulk_create_matches(scope, &matches).await?;
            self.set_stage(&t, stage, &mut journal).await
        }
        .await;
        self.settle(scope, journal, result).await?;

        log::info!(
            "{}: elimination bracket generated with {} qualifiers, {} nodes",
            t.name,
            classified.len(),
            nodes.len()
        );
        Ok(nodes)
    }

    /// Drop the elimination bracket and go back to the finished group stage. Statistics
    /// earned in elimination matches are reversed.
    pub async fn cancel_elimination(&self, scope: Scope) -> TournamentResult<()> {
        let _guard = self.lock(scope.etapa_id).await;
        let t = self.load(scope).await?;
        if !(t.stage.is_elimination() || t.stage == TournamentStage::Finalizada) {
            return Err(TournamentError::validation(format!(
                "Tournament is in stage {:?}; there is no elimination bracket to cancel",
                t.stage
            )));
        }
        self.drop_elimination(&t).await?;
        self.store.update_stage(scope, TournamentStage::Grupos).await?;
        log::info!("{}: elimination cancelled, back to {:?}", t.name, TournamentStage::Grupos);
        Ok(())
    }

    /// Drop every unit, group, match and bracket node, remove the duos from the partner
    /// history and reopen the closed roster for a new draw.
    pub async fn cancel_bracket(&self, scope: Scope) -> TournamentResult<()> {
        let _guard = self.lock(scope.etapa_id).await;
        let t = self.load(scope).await?;
        if !t.stage.has_bracket() {
            return Err(TournamentError::validation(format!(
                "Tournament is in stage {:?}; there is no bracket to cancel",
                t.stage
            )));
        }
        self.drop_elimination(&t).await?;

        let matches: Vec<MatchId> = self.store.list_matches(scope).await?.iter().map(|m| m.id).collect();
        self.store.delete_matches(scope, &matches).await?;
        let groups: Vec<_> = self.store.list_groups(scope).await?.iter().map(|g| g.id).collect();
        self.store.delete_groups(scope, &groups).await?;
        let units: Vec<_> = self.store.list_units(scope).await?.iter().map(|u| u.id).collect();
        self.store.delete_units(scope, &units).await?;
        let removed = self.store.remove_pairs(scope).await?;

        self.store
            .update_stage(scope, TournamentStage::InscricoesEncerradas)
            .await?;
        log::info!(
            "{}: bracket cancelled ({} units, {} groups, {} matches, {} partner records removed)",
            t.name,
            units.len(),
            groups.len(),
            matches.len(),
            removed
        );
        Ok(())
    }

    async fn drop_elimination(&self, t: &Tournament) -> TournamentResult<()> {
        let scope = t.scope();
        let points = t.points;
        let matches: Vec<Match> = self
            .store
            .list_matches(scope)
            .await?
            .into_iter()
            .filter(|m| m.node_id().is_some())
            .collect();
        for m in matches.iter().filter(|m| m.is_finished()) {
            for (unit, delta) in m.stat_deltas(points.win, points.loss) {
                self.store.apply_stats_delta(scope, unit, &-delta).await?;
            }
        }
        let match_ids: Vec<MatchId> = matches.iter().map(|m| m.id).collect();
        self.store.delete_matches(scope, &match_ids).await?;

        let nodes: Vec<NodeId> = self
            .store
            .list_nodes(scope, None)
            .await?
            .iter()
            .map(|n| n.id)
            .collect();
        self.store.delete_nodes(scope, &nodes).await?;

        let classified: Vec<UnitId> = self
            .store
            .list_units(scope)
            .await?
            .iter()
            .filter(|u| u.classificada)
            .map(|u| u.id)
            .collect();
        self.store.set_classificada(scope, &classified, false).await?;
        if !nodes.is_empty() {
            log::info!(
                "{}: removed {} bracket node(s) and {} elimination match(es)",
                t.name,
                nodes.len(),
                match_ids.len()
            );
        }
        Ok(())
    }
}
