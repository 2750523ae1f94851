//! Error types shared by the engines, the repository ports and the service.

use thiserror::Error;

/// Errors raised by a repository implementation.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors that can occur during tournament operations.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TournamentError {
    /// A precondition was violated (odd roster, wrong stage, bad score...).
    /// The message is meant to be shown to the administrator as is.
    #[error("{0}")]
    Validation(String),

    /// A referenced tournament, unit, group, match or bracket node does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Another operation changed the record in the meantime.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TournamentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TournamentError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        TournamentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type TournamentResult<T> = Result<T, TournamentError>;
pub type RepositoryResult<T> = Result<T, RepositoryError>;
