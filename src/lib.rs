//! Bracket generation and progression for amateur sports tournaments: duo pairing,
//! round-robin groups, standings, elimination seeding (generic and team templates) and
//! bracket advancement, behind repository ports.

pub mod config;
pub mod error;
pub mod logic;
pub mod models;
pub mod repository;
pub mod roster;
pub mod service;

pub use config::{AppConfig, EngineConfig};
pub use error::{RepositoryError, TournamentError, TournamentResult};
pub use logic::{
    check_successors, form_pairs, generate_template_bracket, resolve_standings, seed_bracket,
    Advancement, BracketState, ClassificationRow, ExitStage, NodeEvent, Qualifier,
    TieBreakPolicy,
};
pub use models::{
    BracketNode, CompetitiveUnit, Group, GroupId, Match, MatchId, MatchKind, MatchStatus, NodeId,
    Phase, Player, PlayerId, Scope, Score, Slot, Tournament, TournamentFormat, TournamentId,
    TournamentStage, UnitId, UnitStats,
};
pub use repository::{MemoryStore, Store};
pub use roster::{parse_roster_csv, RosterEntry};
pub use service::{GroupStage, GroupStandings, ResultOutcome, TournamentService};
