//! # Commit Errors
//!
//! Three outcomes are distinguished: a refusal over collected validation
//! errors, a retriable concurrency conflict (re-plan against current data),
//! and a fatal state-corruption condition that must never be retried.

use thiserror::Error;

use crate::exec::ExecError;
use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Result type for commit operations
pub type CommitResult<T> = Result<T, CommitError>;

/// Failures of the plan/commit cycle
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Commit refused: {} validation error(s) collected", .errors.len())]
    Validation { errors: Vec<ValidationError> },

    #[error("Concurrent modification of: {}", .modified_tables.join(", "))]
    Conflict { modified_tables: Vec<String> },

    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl CommitError {
    /// True when the caller should re-plan against current data and retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CommitError::Conflict { .. })
    }
}
