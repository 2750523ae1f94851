//! In-memory store: every table behind one `RwLock`, records tagged with their scope.

use super::{
    BracketNodeRepository, GroupRepository, MatchRepository, PartnerHistoryRepository,
    PlayerRepository, TournamentRepository, UnitRepository,
};
use crate::error::{RepositoryError, RepositoryResult};
use crate::models::{
    ArenaId, BracketNode, CompetitiveUnit, Group, GroupId, Match, MatchId, MatchStatus, NodeId,
    NodeStatus, PartnerHistory, Phase, Player, PlayerId, PlayerKey, Scope, Score, StatsDelta,
    Tournament, TournamentId, TournamentStage, UnitId, UnitStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    tournaments: HashMap<TournamentId, Tournament>,
    players: HashMap<PlayerId, (Scope, Player)>,
    history: HashMap<ArenaId, PartnerHistory>,
    units: HashMap<UnitId, (Scope, CompetitiveUnit)>,
    groups: HashMap<GroupId, (Scope, Group)>,
    matches: HashMap<MatchId, (Scope, Match)>,
    nodes: HashMap<NodeId, (Scope, BracketNode)>,
}

/// Storage used by the web binary and the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Operation name that fails on its next call (fault injection for rollback tests).
    fail_next: Mutex<Option<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` (the method name, e.g. `"bulk_create_nodes"`) fail.
    pub fn fail_next(&self, op: &'static str) {
        if let Ok(mut g) = self.fail_next.lock() {
            *g = Some(op);
        }
    }

    fn check_fault(&self, op: &'static str) -> RepositoryResult<()> {
        let mut g = self
            .fail_next
            .lock()
            .map_err(|_| RepositoryError::Storage("lock poisoned".into()))?;
        if *g == Some(op) {
            *g = None;
            return Err(RepositoryError::Storage(format!("injected failure in {op}")));
        }
        Ok(())
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| RepositoryError::Storage("lock poisoned".into()))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".into()))
    }
}

fn scoped<T: Clone>(table: &HashMap<Uuid, (Scope, T)>, scope: Scope) -> Vec<T> {
    table
        .values()
        .filter(|(s, _)| *s == scope)
        .map(|(_, v)| v.clone())
        .collect()
}

fn scoped_get<T: Clone>(table: &HashMap<Uuid, (Scope, T)>, scope: Scope, id: Uuid) -> Option<T> {
    table
        .get(&id)
        .filter(|(s, _)| *s == scope)
        .map(|(_, v)| v.clone())
}

fn scoped_mut<'a, T>(
    table: &'a mut HashMap<Uuid, (Scope, T)>,
    scope: Scope,
    id: Uuid,
    what: &str,
) -> RepositoryResult<&'a mut T> {
    table
        .get_mut(&id)
        .filter(|(s, _)| *s == scope)
        .map(|(_, v)| v)
        .ok_or_else(|| RepositoryError::NotFound(format!("{what} {id}")))
}

fn scoped_delete<T>(table: &mut HashMap<Uuid, (Scope, T)>, scope: Scope, ids: &[Uuid]) {
    for id in ids {
        if table.get(id).is_some_and(|(s, _)| *s == scope) {
            table.remove(id);
        }
    }
}

#[async_trait]
impl TournamentRepository for MemoryStore {
    async fn insert_tournament(&self, tournament: &Tournament) -> RepositoryResult<()> {
        self.check_fault("insert_tournament")?;
        let mut t = self.write()?;
        if t.tournaments.contains_key(&tournament.id) {
            return Err(RepositoryError::Conflict(format!("tournament {}", tournament.id)));
        }
        t.tournaments.insert(tournament.id, tournament.clone());
        Ok(())
    }

    async fn get_tournament(&self, scope: Scope) -> RepositoryResult<Option<Tournament>> {
        Ok(self
            .read()?
            .tournaments
            .get(&scope.etapa_id)
            .filter(|t| t.arena_id == scope.arena_id)
            .cloned())
    }

    async fn update_stage(&self, scope: Scope, stage: TournamentStage) -> RepositoryResult<()> {
        self.check_fault("update_stage")?;
        let mut t = self.write()?;
        let tournament = t
            .tournaments
            .get_mut(&scope.etapa_id)
            .filter(|t| t.arena_id == scope.arena_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tournament {}", scope.etapa_id)))?;
        tournament.stage = stage;
        Ok(())
    }
}

#[async_trait]
impl PlayerRepository for MemoryStore {
    async fn insert_players(&self, scope: Scope, players: &[Player]) -> RepositoryResult<()> {
        self.check_fault("insert_players")?;
        let mut t = self.write()?;
        for p in players {
            t.players.insert(p.id, (scope, p.clone()));
        }
        Ok(())
    }

    async fn list_players(&self, scope: Scope) -> RepositoryResult<Vec<Player>> {
        let mut players = scoped(&self.read()?.players, scope);
        players.sort_by_key(|p| p.registered_at);
        Ok(players)
    }
}

#[async_trait]
impl PartnerHistoryRepository for MemoryStore {
    async fn load_history(&self, arena_id: ArenaId) -> RepositoryResult<PartnerHistory> {
        Ok(self.read()?.history.get(&arena_id).cloned().unwrap_or_default())
    }

    async fn append_pairs(&self, scope: Scope, pairs: &[(PlayerKey, PlayerKey)]) -> RepositoryResult<()> {
        self.check_fault("append_pairs")?;
        let mut t = self.write()?;
        let history = t.history.entry(scope.arena_id).or_default();
        for (a, b) in pairs {
            history.record(a, b, scope.etapa_id);
        }
        Ok(())
    }

    async fn remove_pairs(&self, scope: Scope) -> RepositoryResult<usize> {
        self.check_fault("remove_pairs")?;
        let mut t = self.write()?;
        Ok(t
            .history
            .get_mut(&scope.arena_id)
            .map_or(0, |h| h.remove_tournament(scope.etapa_id)))
    }
}

#[async_trait]
impl UnitRepository for MemoryStore {
    async fn bulk_create_units(&self, scope: Scope, units: &[CompetitiveUnit]) -> RepositoryResult<()> {
        self.check_fault("bulk_create_units")?;
        let mut t = self.write()?;
        for u in units {
            t.units.insert(u.id, (scope, u.clone()));
        }
        Ok(())
    }

    async fn list_units(&self, scope: Scope) -> RepositoryResult<Vec<CompetitiveUnit>> {
        let mut units = scoped(&self.read()?.units, scope);
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    async fn units_by_group(&self, scope: Scope, group: GroupId) -> RepositoryResult<Vec<CompetitiveUnit>> {
        let mut units: Vec<CompetitiveUnit> = scoped(&self.read()?.units, scope)
            .into_iter()
            .filter(|u| u.group_id == Some(group))
            .collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    async fn get_unit(&self, scope: Scope, id: UnitId) -> RepositoryResult<Option<CompetitiveUnit>> {
        Ok(scoped_get(&self.read()?.units, scope, id))
    }

    async fn apply_stats_delta(&self, scope: Scope, id: UnitId, delta: &StatsDelta) -> RepositoryResult<UnitStats> {
        self.check_fault("apply_stats_delta")?;
        let mut t = self.write()?;
        let unit = scoped_mut(&mut t.units, scope, id, "unit")?;
        if unit.stats.apply(delta) {
            log::warn!("Statistics of {} would go negative; clamped at zero ({delta:?})", unit.name);
        }
        Ok(unit.stats)
    }

    async fn set_group_rank(&self, scope: Scope, id: UnitId, posicao: Option<u32>) -> RepositoryResult<()> {
        let mut t = self.write()?;
        scoped_mut(&mut t.units, scope, id, "unit")?.posicao_grupo = posicao;
        Ok(())
    }

    async fn set_classificada(&self, scope: Scope, ids: &[UnitId], classificada: bool) -> RepositoryResult<()> {
        self.check_fault("set_classificada")?;
        let mut t = self.write()?;
        for &id in ids {
            scoped_mut(&mut t.units, scope, id, "unit")?.classificada = classificada;
        }
        Ok(())
    }

    async fn delete_units(&self, scope: Scope, ids: &[UnitId]) -> RepositoryResult<()> {
        scoped_delete(&mut self.write()?.units, scope, ids);
        Ok(())
    }
}

#[async_trait]
impl GroupRepository for MemoryStore {
    async fn bulk_create_groups(&self, scope: Scope, groups: &[Group]) -> RepositoryResult<()> {
        self.check_fault("bulk_create_groups")?;
        let mut t = self.write()?;
        for g in groups {
            t.groups.insert(g.id, (scope, g.clone()));
        }
        Ok(())
    }

    async fn list_groups(&self, scope: Scope) -> RepositoryResult<Vec<Group>> {
        let mut groups = scoped(&self.read()?.groups, scope);
        groups.sort_by_key(|g| g.index);
        Ok(groups)
    }

    async fn get_group(&self, scope: Scope, id: GroupId) -> RepositoryResult<Option<Group>> {
        Ok(scoped_get(&self.read()?.groups, scope, id))
    }

    async fn update_group_progress(&self, scope: Scope, id: GroupId, delta: i32) -> RepositoryResult<Group> {
        self.check_fault("update_group_progress")?;
        let mut t = self.write()?;
        let group = scoped_mut(&mut t.groups, scope, id, "group")?;
        match delta.signum() {
            1 => group.record_finished(),
            -1 => group.record_unfinished(),
            _ => {}
        }
        Ok(group.clone())
    }

    async fn delete_groups(&self, scope: Scope, ids: &[GroupId]) -> RepositoryResult<()> {
        scoped_delete(&mut self.write()?.groups, scope, ids);
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn bulk_create_matches(&self, scope: Scope, matches: &[Match]) -> RepositoryResult<()> {
        self.check_fault("bulk_create_matches")?;
        let mut t = self.write()?;
        for m in matches {
            t.matches.insert(m.id, (scope, m.clone()));
        }
        Ok(())
    }

    async fn get_match(&self, scope: Scope, id: MatchId) -> RepositoryResult<Option<Match>> {
        Ok(scoped_get(&self.read()?.matches, scope, id))
    }

    async fn list_matches(&self, scope: Scope) -> RepositoryResult<Vec<Match>> {
        Ok(scoped(&self.read()?.matches, scope))
    }

    async fn matches_by_group(&self, scope: Scope, group: GroupId) -> RepositoryResult<Vec<Match>> {
        Ok(scoped(&self.read()?.matches, scope)
            .into_iter()
            .filter(|m| m.group_id() == Some(group))
            .collect())
    }

    async fn save_result(
        &self,
        scope: Scope,
        id: MatchId,
        score: Option<Score>,
        status: MatchStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        self.check_fault("save_result")?;
        let mut t = self.write()?;
        let m = scoped_mut(&mut t.matches, scope, id, "match")?;
        m.score = score;
        m.status = status;
        m.finished_at = finished_at;
        Ok(())
    }

    async fn delete_matches(&self, scope: Scope, ids: &[MatchId]) -> RepositoryResult<()> {
        scoped_delete(&mut self.write()?.matches, scope, ids);
        Ok(())
    }
}

#[async_trait]
impl BracketNodeRepository for MemoryStore {
    async fn bulk_create_nodes(&self, scope: Scope, nodes: &[BracketNode]) -> RepositoryResult<()> {
        self.check_fault("bulk_create_nodes")?;
        let mut t = self.write()?;
        for n in nodes {
            t.nodes.insert(n.id, (scope, n.clone()));
        }
        Ok(())
    }

    async fn list_nodes(&self, scope: Scope, phase: Option<Phase>) -> RepositoryResult<Vec<BracketNode>> {
        let mut nodes: Vec<BracketNode> = scoped(&self.read()?.nodes, scope)
            .into_iter()
            .filter(|n| phase.map_or(true, |p| n.phase == p))
            .collect();
        nodes.sort_by_key(|n| (n.phase, n.ordem));
        Ok(nodes)
    }

    async fn get_node(&self, scope: Scope, id: NodeId) -> RepositoryResult<Option<BracketNode>> {
        Ok(scoped_get(&self.read()?.nodes, scope, id))
    }

    async fn update_node(&self, scope: Scope, node: &BracketNode) -> RepositoryResult<()> {
        self.check_fault("update_node")?;
        let mut t = self.write()?;
        *scoped_mut(&mut t.nodes, scope, node.id, "bracket node")? = node.clone();
        Ok(())
    }

    async fn update_node_if_status(
        &self,
        scope: Scope,
        node: &BracketNode,
        expected: NodeStatus,
    ) -> RepositoryResult<bool> {
        self.check_fault("update_node_if_status")?;
        let mut t = self.write()?;
        let stored = scoped_mut(&mut t.nodes, scope, node.id, "bracket node")?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = node.clone();
        Ok(true)
    }

    async fn delete_nodes(&self, scope: Scope, ids: &[NodeId]) -> RepositoryResult<()> {
        scoped_delete(&mut self.write()?.nodes, scope, ids);
        Ok(())
    }
}
