//! # Storage Errors

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures surfaced by the storage collaborator
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Collection is unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Wraps a backend failure message.
    pub fn backend(reason: impl Into<String>) -> Self {
        StorageError::Backend(reason.into())
    }
}
