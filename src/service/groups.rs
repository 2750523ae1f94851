//! Group stage: forming units and groups, recording group results, refreshing positions.

use super::journal::Journal;
use super::{net_deltas, TournamentService};
use crate::error::{TournamentError, TournamentResult};
use crate::logic::{
    deal_into_groups, form_pairs, group_sizes, partition_units, resolve_standings,
    round_robin_pairings,
};
use crate::models::{
    CompetitiveUnit, Group, Match, MatchKind, MatchStatus, Player, PlayerId, Score, Scope,
    Tournament, TournamentFormat, TournamentStage, UnitKind,
};
use crate::repository::Store;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// What forming the group stage produced.
#[derive(Clone, Debug, Serialize)]
pub struct GroupStage {
    pub units: Vec<CompetitiveUnit>,
    pub groups: Vec<Group>,
    pub matches: Vec<Match>,
    /// Duos that had already played together in an earlier tournament of the arena.
    pub repeated_pairs: usize,
}

fn duo_unit(t: &Tournament, a: &Player, b: &Player) -> CompetitiveUnit {
    let mut unit = CompetitiveUnit::new(
        t.id,
        UnitKind::Dupla,
        format!("{} / {}", a.name, b.name),
        vec![a.id, b.id],
    );
    unit.cabeca_de_chave = a.cabeca_de_chave || b.cabeca_de_chave;
    unit
}

/// One unit per team name. A team is protected when any member is.
fn team_units(t: &Tournament, players: &[Player]) -> TournamentResult<Vec<CompetitiveUnit>> {
    let mut teams: BTreeMap<&str, Vec<&Player>> = BTreeMap::new();
    for p in players {
        let team = p.equipe.as_deref().ok_or_else(|| {
            TournamentError::validation(format!("Player {} has no team", p.name))
        })?;
        teams.entry(team).or_default().push(p);
    }
    Ok(teams
        .into_iter()
        .map(|(name, members)| {
            let mut unit = CompetitiveUnit::new(
                t.id,
                UnitKind::Equipe,
                name,
                members.iter().map(|p| p.id).collect(),
            );
            unit.cabeca_de_chave = members.iter().any(|p| p.cabeca_de_chave);
            unit
        })
        .collect())
}

impl<S: Store> TournamentService<S> {
    /// Turn the closed roster into units, deal them into groups and schedule every
    /// group match. Duos come from the pairing engine; teams come from the roster.
    pub async fn form_units_and_groups(&self, scope: Scope) -> TournamentResult<GroupStage> {
        let _guard = self.lock(scope.etapa_id).await;
        let t = self.load(scope).await?;
        t.require_stage(TournamentStage::InscricoesEncerradas)?;
        let players = self.store.list_players(scope).await?;

        let mut journal = Journal::default();
        let result = self.form_group_stage(&t, &players, &mut journal).await;
        self.settle(scope, journal, result).await
    }

    async fn form_group_stage(
        &self,
        t: &Tournament,
        players: &[Player],
        journal: &mut Journal,
    ) -> TournamentResult<GroupStage> {
        let scope = t.scope();
        let (mut units, pairs, repeated_pairs) = match t.format {
            TournamentFormat::Duplas => {
                let history = self.store.load_history(t.arena_id).await?;
                let outcome = self.draw(|rng| {
                    form_pairs(players, &history, self.config.pairing_attempts, rng)
                })?;
                let by_id: HashMap<PlayerId, &Player> = players.iter().map(|p| (p.id, p)).collect();
                let duos: Vec<(&Player, &Player)> = outcome
                    .pairs
                    .iter()
                    .filter_map(|(a, b)| Some((*by_id.get(a)?, *by_id.get(b)?)))
                    .collect();
                let units = duos.iter().map(|&(a, b)| duo_unit(t, a, b)).collect::<Vec<_>>();
                let keys = duos.iter().map(|(a, b)| (a.key(), b.key())).collect::<Vec<_>>();
                if outcome.repeated > 0 {
                    log::warn!(
                        "{} duo(s) in {} already played together before",
                        outcome.repeated,
                        t.name
                    );
                }
                (units, keys, outcome.repeated)
            }
            TournamentFormat::Equipes => (team_units(t, players)?, Vec::new(), 0),
        };

        self.draw(|rng| units.shuffle(rng));
        let members = match t.format {
            TournamentFormat::Duplas => partition_units(&units, &group_sizes(units.len())?)?,
            TournamentFormat::Equipes => {
                let count = t.team_group_count.ok_or_else(|| {
                    TournamentError::validation("Team tournaments need a group count")
                })?;
                deal_into_groups(&units, count)?
            }
        };

        let groups: Vec<Group> = members
            .into_iter()
            .enumerate()
            .map(|(i, ids)| Group::new(t.id, i, ids))
            .collect();
        for group in &groups {
            for unit in units.iter_mut().filter(|u| group.units.contains(&u.id)) {
                unit.assign_group(group.id)?;
            }
        }
        let matches: Vec<Match> = groups
            .iter()
            .flat_map(|g| {
                round_robin_pairings(&g.units)
                    .into_iter()
                    .map(move |(a, b)| Match::new(t.id, MatchKind::Grupo { group_id: g.id }, a, b))
            })
            .collect();

        journal.created_units.extend(units.iter().map(|u| u.id));
        self.store.bulk_create_units(scope, &units).await?;
        journal.created_groups.extend(groups.iter().map(|g| g.id));
        self.store.bulk_create_groups(scope, &groups).await?;
        journal.created_matches.extend(matches.iter().map(|m| m.id));
        self.store.bulk_create_matches(scope, &matches).await?;
        if !pairs.is_empty() {
            journal.pairs_appended = true;
            self.store.append_pairs(scope, &pairs).await?;
        }
        self.set_stage(t, TournamentStage::ChavesGeradas, journal).await?;

        for g in &groups {
            log::info!("{}: {} units, {} matches", g.name, g.units.len(), g.total_partidas);
        }
        Ok(GroupStage {
            units,
            groups,
            matches,
            repeated_pairs,
        })
    }

    /// Record or edit a group match. Statistics move by the difference between the old
    /// and the new result, and the group's finished counter only moves on a first result.
    pub(super) async fn record_group_result(
        &self,
        t: &Tournament,
        m: &Match,
        score: Score,
        journal: &mut Journal,
    ) -> TournamentResult<(Match, bool)> {
        let scope = t.scope();
        if !t.stage.is_group_stage() {
            return Err(TournamentError::validation(
                "Group results are locked once the elimination bracket exists; cancel it first",
            ));
        }
        let group_id = m
            .group_id()
            .ok_or_else(|| TournamentError::validation("Not a group match"))?;
        let mut group = self
            .store
            .get_group(scope, group_id)
            .await?
            .ok_or_else(|| TournamentError::not_found("group", group_id))?;

        let mut updated = m.clone();
        updated.score = Some(score);
        updated.status = MatchStatus::Finished;
        updated.finished_at = Some(Utc::now());

        journal.snapshot_match(m);
        self.store
            .save_result(scope, m.id, updated.score.clone(), updated.status, updated.finished_at)
            .await?;
        let points = t.points;
        let deltas = net_deltas(
            &m.stat_deltas(points.win, points.loss),
            &updated.stat_deltas(points.win, points.loss),
        );
        self.apply_deltas(scope, &deltas, journal).await?;

        if !m.is_finished() {
            journal.group_progress.push((group_id, 1));
            group = self.store.update_group_progress(scope, group_id, 1).await?;
        }
        self.refresh_group_ranks(t, &group, journal).await?;
        if t.stage == TournamentStage::ChavesGeradas {
            self.set_stage(t, TournamentStage::Grupos, journal).await?;
        }
        log::info!(
            "{}: result recorded ({}/{} played)",
            group.name,
            group.partidas_finalizadas,
            group.total_partidas
        );
        Ok((updated, group.completo))
    }

    /// Store final positions for a complete group; clear them while it is still in play.
    async fn refresh_group_ranks(
        &self,
        t: &Tournament,
        group: &Group,
        journal: &mut Journal,
    ) -> TournamentResult<()> {
        let scope = t.scope();
        let units = self.store.units_by_group(scope, group.id).await?;

        let positions: HashMap<_, _> = if group.completo {
            let matches = self.store.matches_by_group(scope, group.id).await?;
            let policy = self.config.tie_break;
            let standings =
                self.draw(|rng| resolve_standings(&group.units, &matches, t.points, policy, rng));
            if !standings.drawn.is_empty() {
                let names: Vec<&str> = units
                    .iter()
                    .filter(|u| standings.drawn.contains(&u.id))
                    .map(|u| u.name.as_str())
                    .collect();
                log::warn!(
                    target: "audit",
                    "{} of {}: unbreakable tie settled by {:?} draw among {:?}",
                    group.name,
                    t.name,
                    policy,
                    names
                );
            }
            standings.rows.iter().map(|r| (r.unit_id, r.posicao)).collect()
        } else {
            HashMap::new()
        };

        for unit in &units {
            let posicao = positions.get(&unit.id).copied();
            if unit.posicao_grupo != posicao {
                journal.ranks.push((unit.id, unit.posicao_grupo));
                self.store.set_group_rank(scope, unit.id, posicao).await?;
            }
        }
        Ok(())
    }
}
