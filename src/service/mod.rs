//! Tournament service: loads state through the repository ports, runs the engines in
//! `logic` and writes the results back.
//!
//! Writes to one tournament are serialized by a per-tournament lock. Multi-step writes
//! keep a [`Journal`] and undo themselves when a step fails.

mod elimination;
mod groups;
mod journal;

pub use elimination::ResultOutcome;
pub use groups::GroupStage;

use crate::config::EngineConfig;
use crate::error::{TournamentError, TournamentResult};
use crate::logic::{
    final_classification, group_stats, resolve_standings, ClassificationRow, StandingRow,
    TieBreakPolicy,
};
use crate::models::{
    player_key, ArenaId, BracketNode, CompetitiveUnit, Group, GroupId, Match, Phase, Player,
    PlayerKey, Scope, StatsDelta, Tournament, TournamentFormat, TournamentId, TournamentStage,
    UnitId,
};
use crate::repository::Store;
use crate::roster::{parse_roster_csv, RosterEntry};
use journal::Journal;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Standings of one group as shown to the administrator.
#[derive(Clone, Debug, Serialize)]
pub struct GroupStandings {
    pub group: Group,
    pub rows: Vec<StandingRow>,
    /// The group still has matches to play; positions may change.
    pub provisional: bool,
}

pub struct TournamentService<S> {
    store: Arc<S>,
    config: EngineConfig,
    rng: Mutex<StdRng>,
    locks: Mutex<HashMap<TournamentId, Arc<AsyncMutex<()>>>>,
}

impl<S: Store> TournamentService<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    /// Service whose draws (pairings, group order, tie-breaks) are reproducible.
    pub fn with_seed(store: Arc<S>, config: EngineConfig, seed: u64) -> Self {
        Self::with_rng(store, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<S>, config: EngineConfig, rng: StdRng) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(rng),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait for exclusive write access to one tournament.
    ///
    /// Locks nobody holds or waits for are dropped from the map on the way.
    async fn lock(&self, id: TournamentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|k, l| *k == id || Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    fn draw<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    async fn load(&self, scope: Scope) -> TournamentResult<Tournament> {
        self.store
            .get_tournament(scope)
            .await?
            .ok_or_else(|| TournamentError::not_found("tournament", scope.etapa_id))
    }

    async fn set_stage(
        &self,
        t: &Tournament,
        stage: TournamentStage,
        journal: &mut Journal,
    ) -> TournamentResult<()> {
        if t.stage == stage {
            return Ok(());
        }
        journal.previous_stage.get_or_insert(t.stage);
        self.store.update_stage(t.scope(), stage).await?;
        log::info!("Tournament {} moved {:?} -> {:?}", t.name, t.stage, stage);
        Ok(())
    }

    /// Apply statistic changes unit by unit, recording each in the journal.
    async fn apply_deltas(
        &self,
        scope: Scope,
        deltas: &[(UnitId, StatsDelta)],
        journal: &mut Journal,
    ) -> TournamentResult<()> {
        for &(unit, delta) in deltas {
            if delta.is_zero() {
                continue;
            }
            journal.deltas.push((unit, delta));
            self.store.apply_stats_delta(scope, unit, &delta).await?;
            log::debug!("Stats of {unit} moved by {delta:?}");
        }
        Ok(())
    }

    /// Run `result`'s journal compensation if it failed.
    async fn settle<T>(
        &self,
        scope: Scope,
        journal: Journal,
        result: TournamentResult<T>,
    ) -> TournamentResult<T> {
        if result.is_err() {
            journal.rollback(self.store.as_ref(), scope).await;
        }
        result
    }

    // ---- lifecycle -------------------------------------------------------------------

    /// Create a tournament in `RASCUNHO`. Team tournaments must say how many groups
    /// (2 to 8) their teams are dealt into.
    pub async fn create_tournament(
        &self,
        arena_id: ArenaId,
        name: &str,
        format: TournamentFormat,
        team_group_count: Option<usize>,
    ) -> TournamentResult<Tournament> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TournamentError::validation("Tournament name cannot be empty"));
        }
        let mut t = Tournament::new(arena_id, name, format);
        t.points = self.config.points;
        match (format, team_group_count) {
            (TournamentFormat::Equipes, Some(n)) if (2..=8).contains(&n) => t = t.with_team_groups(n),
            (TournamentFormat::Equipes, Some(n)) => {
                return Err(TournamentError::validation(format!(
                    "Team tournaments use between 2 and 8 groups (got {n})"
                )))
            }
            (TournamentFormat::Equipes, None) => {
                return Err(TournamentError::validation(
                    "Team tournaments need a group count",
                ))
            }
            (TournamentFormat::Duplas, Some(_)) => {
                return Err(TournamentError::validation(
                    "Duo tournaments size their groups automatically",
                ))
            }
            (TournamentFormat::Duplas, None) => {}
        }
        self.store.insert_tournament(&t).await?;
        log::info!("Created tournament {} ({:?}) in arena {}", t.name, t.format, t.arena_id);
        Ok(t)
    }

    pub async fn get_tournament(&self, scope: Scope) -> TournamentResult<Tournament> {
        self.load(scope).await
    }

    pub async fn open_registrations(&self, scope: Scope) -> TournamentResult<Tournament> {
        let _guard = self.lock(scope.etapa_id).await;
        let mut t = self.load(scope).await?;
        t.open_registrations()?;
        self.store.update_stage(scope, t.stage).await?;
        log::info!("Registrations opened for {}", t.name);
        Ok(t)
    }

    pub async fn close_registrations(&self, scope: Scope) -> TournamentResult<Tournament> {
        let _guard = self.lock(scope.etapa_id).await;
        let mut t = self.load(scope).await?;
        t.close_registrations()?;
        self.store.update_stage(scope, t.stage).await?;
        log::info!("Registrations closed for {}", t.name);
        Ok(t)
    }

    /// Register one player. Names are unique per tournament, ignoring case and spacing.
    pub async fn register_player(&self, scope: Scope, entry: RosterEntry) -> TournamentResult<Player> {
        let mut added = self.register_all(scope, vec![entry]).await?;
        added
            .pop()
            .ok_or_else(|| TournamentError::validation("No player registered"))
    }

    /// Register every row of a CSV roster, or none of them if any row is invalid.
    pub async fn import_roster(&self, scope: Scope, csv: &[u8]) -> TournamentResult<Vec<Player>> {
        let entries = parse_roster_csv(csv)?;
        if entries.is_empty() {
            return Err(TournamentError::validation("Roster file has no players"));
        }
        let players = self.register_all(scope, entries).await?;
        log::info!("Imported {} player(s) from roster", players.len());
        Ok(players)
    }

    async fn register_all(&self, scope: Scope, entries: Vec<RosterEntry>) -> TournamentResult<Vec<Player>> {
        let _guard = self.lock(scope.etapa_id).await;
        let t = self.load(scope).await?;
        t.require_stage(TournamentStage::InscricoesAbertas)?;

        let mut taken: Vec<PlayerKey> = self
            .store
            .list_players(scope)
            .await?
            .iter()
            .map(Player::key)
            .collect();

        let mut players = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.nome.trim();
            if name.is_empty() {
                return Err(TournamentError::validation("Player name cannot be empty"));
            }
            let key = player_key(name);
            if taken.contains(&key) {
                return Err(TournamentError::validation(format!(
                    "Player {name} is already registered"
                )));
            }
            let mut player = Player::new(t.id, name);
            player.cabeca_de_chave = entry.cabeca_de_chave;
            match (t.format, entry.equipe) {
                (TournamentFormat::Equipes, Some(team)) => player = player.in_team(team.trim()),
                (TournamentFormat::Equipes, None) => {
                    return Err(TournamentError::validation(format!(
                        "Player {name} needs a team in a team tournament"
                    )))
                }
                (TournamentFormat::Duplas, _) => {}
            }
            taken.push(key);
            players.push(player);
        }
        self.store.insert_players(scope, &players).await?;
        for p in &players {
            log::info!("Registered {} in {}", p.name, t.name);
        }
        Ok(players)
    }

    // ---- queries ---------------------------------------------------------------------

    pub async fn list_players(&self, scope: Scope) -> TournamentResult<Vec<Player>> {
        let mut players = self.store.list_players(scope).await?;
        players.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then_with(|| a.name.cmp(&b.name)));
        Ok(players)
    }

    pub async fn list_units(&self, scope: Scope) -> TournamentResult<Vec<CompetitiveUnit>> {
        let mut units = self.store.list_units(scope).await?;
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    pub async fn list_groups(&self, scope: Scope) -> TournamentResult<Vec<Group>> {
        let mut groups = self.store.list_groups(scope).await?;
        groups.sort_by_key(|g| g.index);
        Ok(groups)
    }

    /// Matches of the tournament, or of one group.
    pub async fn list_matches(&self, scope: Scope, group: Option<GroupId>) -> TournamentResult<Vec<Match>> {
        Ok(match group {
            Some(g) => self.store.matches_by_group(scope, g).await?,
            None => self.store.list_matches(scope).await?,
        })
    }

    /// Table of one group. A complete group shows its stored positions; a group still
    /// in play is ranked on the fly without drawing lots.
    pub async fn get_standings(&self, scope: Scope, group_id: GroupId) -> TournamentResult<GroupStandings> {
        let t = self.load(scope).await?;
        let group = self
            .store
            .get_group(scope, group_id)
            .await?
            .ok_or_else(|| TournamentError::not_found("group", group_id))?;
        let units = self.store.units_by_group(scope, group_id).await?;
        let matches = self.store.matches_by_group(scope, group_id).await?;

        let stored: Option<Vec<(UnitId, u32)>> = units
            .iter()
            .map(|u| u.posicao_grupo.map(|p| (u.id, p)))
            .collect();
        let rows = match stored {
            Some(mut positions) if group.completo && !positions.is_empty() => {
                positions.sort_by_key(|&(_, p)| p);
                let stats = group_stats(&group.units, &matches, t.points);
                positions
                    .into_iter()
                    .map(|(unit_id, posicao)| StandingRow {
                        unit_id,
                        posicao,
                        stats: stats.get(&unit_id).copied().unwrap_or_default(),
                    })
                    .collect()
            }
            _ => {
                let mut rng = StdRng::seed_from_u64(0);
                resolve_standings(&group.units, &matches, t.points, TieBreakPolicy::Deterministic, &mut rng).rows
            }
        };
        Ok(GroupStandings {
            provisional: !group.completo,
            group,
            rows,
        })
    }

    /// Bracket nodes, all or one phase, ordered by phase then `ordem`.
    pub async fn get_bracket(&self, scope: Scope, phase: Option<Phase>) -> TournamentResult<Vec<BracketNode>> {
        self.load(scope).await?;
        Ok(self.store.list_nodes(scope, phase).await?)
    }

    /// Every unit with where it went out and its ranking points. Only available once
    /// the final is played.
    pub async fn get_final_classification(&self, scope: Scope) -> TournamentResult<Vec<ClassificationRow>> {
        let t = self.load(scope).await?;
        t.require_stage(TournamentStage::Finalizada)?;
        let units = self.store.list_units(scope).await?;
        let nodes = self.store.list_nodes(scope, None).await?;
        Ok(final_classification(&units, &nodes))
    }
}

/// Net change per unit of replacing `old` statistics with `new` ones.
fn net_deltas(old: &[(UnitId, StatsDelta)], new: &[(UnitId, StatsDelta)]) -> Vec<(UnitId, StatsDelta)> {
    let mut out: Vec<(UnitId, StatsDelta)> = Vec::new();
    let changes = old.iter().map(|&(u, d)| (u, -d)).chain(new.iter().copied());
    for (unit, d) in changes {
        match out.iter_mut().find(|(u, _)| *u == unit) {
            Some((_, acc)) => *acc = acc.plus(d),
            None => out.push((unit, d)),
        }
    }
    out.retain(|(_, d)| !d.is_zero());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use uuid::Uuid;

    #[test]
    fn replacing_a_result_nets_per_unit() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let win = StatsDelta { jogos: 1, vitorias: 1, pontos: 3, ..Default::default() };
        let loss = StatsDelta { jogos: 1, derrotas: 1, ..Default::default() };
        let net = net_deltas(&[(a, win), (b, loss)], &[(a, loss), (b, win)]);
        assert_eq!(net.len(), 2);
        let of_a = net.iter().find(|(u, _)| *u == a).map(|(_, d)| *d).unwrap();
        assert_eq!(of_a.vitorias, -1);
        assert_eq!(of_a.derrotas, 1);
        assert_eq!(of_a.pontos, -3);
        assert_eq!(of_a.jogos, 0);

        assert!(net_deltas(&[(a, win)], &[(a, win)]).is_empty());
    }

    #[tokio::test]
    async fn idle_tournament_locks_are_pruned() {
        let svc = TournamentService::new(Arc::new(MemoryStore::new()), EngineConfig::default());
        let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
        let held = svc.lock(t1).await;
        drop(svc.lock(t2).await);
        assert_eq!(svc.locks.lock().unwrap().len(), 2);

        let _again = svc.lock(Uuid::new_v4()).await;
        let locks = svc.locks.lock().unwrap();
        assert_eq!(locks.len(), 2);
        assert!(locks.contains_key(&t1));
        drop(locks);
        drop(held);
    }
}
