//! Tournament business logic: pairing, groups, standings, seeding, templates, progression.

pub mod advancement;
pub mod pairing;
pub mod ranking;
pub mod round_robin;
pub mod seeding;
pub mod standings;
pub mod templates;

pub use advancement::{check_successors, Advancement, BracketState, NodeEvent, NodeReset};
pub use pairing::{form_pairs, PairingOutcome};
pub use ranking::{exit_stage, final_classification, ranking_points, ClassificationRow, ExitStage};
pub use round_robin::{deal_into_groups, group_sizes, partition_units, round_robin_pairings};
pub use seeding::{
    bracket_order, first_round_nodes, order_qualifiers, seed_bracket, seed_pairings, Qualifier,
    SeededBracket,
};
pub use standings::{
    compare_without_head_to_head, group_stats, resolve_standings, StandingRow, Standings,
    TieBreakPolicy,
};
pub use templates::{generate_template_bracket, template_for, templates, BracketTemplate, TemplateSlot};
