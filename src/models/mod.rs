//! Data structures for the tournament: players, units, groups, matches, bracket nodes.

mod bracket;
mod game;
mod group;
mod player;
mod tournament;
mod unit;

pub use bracket::{BracketNode, NodeId, NodeStatus, Phase, Slot};
pub use game::{
    Match, MatchId, MatchKind, MatchStatus, Score, SetScore, Side, SideTotals, MAX_GAMES_PER_SET,
    MAX_SETS,
};
pub use group::{group_letter, Group, GroupId};
pub use player::{player_key, PartnerHistory, Partnership, Player, PlayerId, PlayerKey};
pub use tournament::{
    ArenaId, PointsRule, Scope, Tournament, TournamentFormat, TournamentId, TournamentStage,
};
pub use unit::{CompetitiveUnit, StatsDelta, UnitId, UnitKind, UnitStats};
