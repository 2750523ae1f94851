//! Tournament ("etapa") aggregate and its lifecycle stage.

use crate::error::{TournamentError, TournamentResult};
use crate::models::bracket::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tournament.
pub type TournamentId = Uuid;

/// Unique identifier for the venue (tenant) owning tournaments.
pub type ArenaId = Uuid;

/// Tenant + tournament keys every repository call is filtered by.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub arena_id: ArenaId,
    pub etapa_id: TournamentId,
}

impl Scope {
    pub fn new(arena_id: ArenaId, etapa_id: TournamentId) -> Self {
        Self { arena_id, etapa_id }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    /// Players are paired into duos, grouped in 3s (see the round-robin policy).
    #[default]
    Duplas,
    /// Registered teams, dealt into a fixed number of groups and a template bracket.
    Equipes,
}

/// Lifecycle of a tournament.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStage {
    #[default]
    Rascunho,
    InscricoesAbertas,
    InscricoesEncerradas,
    /// Units and groups exist; no result recorded yet.
    ChavesGeradas,
    Grupos,
    Oitavas,
    Quartas,
    Semifinal,
    Final,
    Finalizada,
}

impl TournamentStage {
    pub fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::Oitavas => TournamentStage::Oitavas,
            Phase::Quartas => TournamentStage::Quartas,
            Phase::Semifinal => TournamentStage::Semifinal,
            Phase::Final => TournamentStage::Final,
        }
    }

    pub fn is_group_stage(self) -> bool {
        matches!(self, TournamentStage::ChavesGeradas | TournamentStage::Grupos)
    }

    pub fn is_elimination(self) -> bool {
        matches!(
            self,
            TournamentStage::Oitavas
                | TournamentStage::Quartas
                | TournamentStage::Semifinal
                | TournamentStage::Final
        )
    }

    /// Bracket entities (units, groups, nodes) exist in this stage.
    pub fn has_bracket(self) -> bool {
        self.is_group_stage() || self.is_elimination() || self == TournamentStage::Finalizada
    }
}

/// Points awarded per group match.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PointsRule {
    pub win: i32,
    pub loss: i32,
}

impl Default for PointsRule {
    fn default() -> Self {
        Self { win: 3, loss: 0 }
    }
}

/// A tournament run by one venue.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub arena_id: ArenaId,
    pub name: String,
    pub format: TournamentFormat,
    pub stage: TournamentStage,
    /// Team format only: how many groups the teams are dealt into (2..=8).
    pub team_group_count: Option<usize>,
    pub points: PointsRule,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    pub fn new(arena_id: ArenaId, name: impl Into<String>, format: TournamentFormat) -> Self {
        Self {
            id: Uuid::new_v4(),
            arena_id,
            name: name.into(),
            format,
            stage: TournamentStage::Rascunho,
            team_group_count: None,
            points: PointsRule::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_team_groups(mut self, groups: usize) -> Self {
        self.team_group_count = Some(groups);
        self
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.arena_id, self.id)
    }

    /// Fail unless the tournament is in `expected`.
    pub fn require_stage(&self, expected: TournamentStage) -> TournamentResult<()> {
        if self.stage != expected {
            return Err(TournamentError::validation(format!(
                "Tournament is in stage {:?}, expected {:?}",
                self.stage, expected
            )));
        }
        Ok(())
    }

    pub fn open_registrations(&mut self) -> TournamentResult<()> {
        self.require_stage(TournamentStage::Rascunho)?;
        self.stage = TournamentStage::InscricoesAbertas;
        Ok(())
    }

    pub fn close_registrations(&mut self) -> TournamentResult<()> {
        self.require_stage(TournamentStage::InscricoesAbertas)?;
        self.stage = TournamentStage::InscricoesEncerradas;
        Ok(())
    }
}
