//! Persistence ports. Every call is filtered by the tenant (`arena_id`) and the
//! tournament (`etapa_id`) carried in [`Scope`].

mod memory;

pub use memory::MemoryStore;

use crate::error::RepositoryResult;
use crate::models::{
    ArenaId, BracketNode, CompetitiveUnit, Group, GroupId, Match, MatchId, MatchStatus, NodeId,
    NodeStatus, PartnerHistory, Phase, Player, PlayerKey, Scope, Score, StatsDelta, Tournament,
    TournamentStage, UnitId, UnitStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait TournamentRepository: Send + Sync {
    async fn insert_tournament(&self, tournament: &Tournament) -> RepositoryResult<()>;
    async fn get_tournament(&self, scope: Scope) -> RepositoryResult<Option<Tournament>>;
    async fn update_stage(&self, scope: Scope, stage: TournamentStage) -> RepositoryResult<()>;
}

#[async_trait]
pub trait PlayerRepository: Send + Sync {
    async fn insert_players(&self, scope: Scope, players: &[Player]) -> RepositoryResult<()>;
    async fn list_players(&self, scope: Scope) -> RepositoryResult<Vec<Player>>;
}

/// Partner history is per venue: it spans every tournament of the arena and is keyed
/// by [`PlayerKey`], so a player keeps their history when registering again.
#[async_trait]
pub trait PartnerHistoryRepository: Send + Sync {
    async fn load_history(&self, arena_id: ArenaId) -> RepositoryResult<PartnerHistory>;
    /// Append pairs formed in `scope`'s tournament.
    async fn append_pairs(&self, scope: Scope, pairs: &[(PlayerKey, PlayerKey)]) -> RepositoryResult<()>;
    /// Drop the pairs formed in `scope`'s tournament. Returns how many were removed.
    async fn remove_pairs(&self, scope: Scope) -> RepositoryResult<usize>;
}

#[async_trait]
pub trait UnitRepository: Send + Sync {
    async fn bulk_create_units(&self, scope: Scope, units: &[CompetitiveUnit]) -> RepositoryResult<()>;
    async fn list_units(&self, scope: Scope) -> RepositoryResult<Vec<CompetitiveUnit>>;
    async fn units_by_group(&self, scope: Scope, group: GroupId) -> RepositoryResult<Vec<CompetitiveUnit>>;
    async fn get_unit(&self, scope: Scope, id: UnitId) -> RepositoryResult<Option<CompetitiveUnit>>;
    /// Add `delta` to the unit's statistics atomically and return the new totals.
    async fn apply_stats_delta(&self, scope: Scope, id: UnitId, delta: &StatsDelta) -> RepositoryResult<UnitStats>;
    async fn set_group_rank(&self, scope: Scope, id: UnitId, posicao: Option<u32>) -> RepositoryResult<()>;
    async fn set_classificada(&self, scope: Scope, ids: &[UnitId], classificada: bool) -> RepositoryResult<()>;
    async fn delete_units(&self, scope: Scope, ids: &[UnitId]) -> RepositoryResult<()>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn bulk_create_groups(&self, scope: Scope, groups: &[Group]) -> RepositoryResult<()>;
    async fn list_groups(&self, scope: Scope) -> RepositoryResult<Vec<Group>>;
    async fn get_group(&self, scope: Scope, id: GroupId) -> RepositoryResult<Option<Group>>;
    /// Move the finished-match counter by `delta` (+1 or -1) and return the updated group.
    async fn update_group_progress(&self, scope: Scope, id: GroupId, delta: i32) -> RepositoryResult<Group>;
    async fn delete_groups(&self, scope: Scope, ids: &[GroupId]) -> RepositoryResult<()>;
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn bulk_create_matches(&self, scope: Scope, matches: &[Match]) -> RepositoryResult<()>;
    async fn get_match(&self, scope: Scope, id: MatchId) -> RepositoryResult<Option<Match>>;
    async fn list_matches(&self, scope: Scope) -> RepositoryResult<Vec<Match>>;
    async fn matches_by_group(&self, scope: Scope, group: GroupId) -> RepositoryResult<Vec<Match>>;
    async fn save_result(
        &self,
        scope: Scope,
        id: MatchId,
        score: Option<Score>,
        status: MatchStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()>;
    async fn delete_matches(&self, scope: Scope, ids: &[MatchId]) -> RepositoryResult<()>;
}

#[async_trait]
pub trait BracketNodeRepository: Send + Sync {
    async fn bulk_create_nodes(&self, scope: Scope, nodes: &[BracketNode]) -> RepositoryResult<()>;
    /// All nodes, or the nodes of one phase, ordered by phase then `ordem`.
    async fn list_nodes(&self, scope: Scope, phase: Option<Phase>) -> RepositoryResult<Vec<BracketNode>>;
    async fn get_node(&self, scope: Scope, id: NodeId) -> RepositoryResult<Option<BracketNode>>;
    async fn update_node(&self, scope: Scope, node: &BracketNode) -> RepositoryResult<()>;
    /// Write `node` only if the stored status is still `expected`. Returns false otherwise.
    async fn update_node_if_status(
        &self,
        scope: Scope,
        node: &BracketNode,
        expected: NodeStatus,
    ) -> RepositoryResult<bool>;
    async fn delete_nodes(&self, scope: Scope, ids: &[NodeId]) -> RepositoryResult<()>;
}

/// Everything the service needs from storage.
pub trait Store:
    TournamentRepository
    + PlayerRepository
    + PartnerHistoryRepository
    + UnitRepository
    + GroupRepository
    + MatchRepository
    + BracketNodeRepository
{
}

impl<T> Store for T where
    T: TournamentRepository
        + PlayerRepository
        + PartnerHistoryRepository
        + UnitRepository
        + GroupRepository
        + MatchRepository
        + BracketNodeRepository
{
}
