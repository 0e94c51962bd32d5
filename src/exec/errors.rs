//! # Structural Execution Errors
//!
//! Malformed statement shape, unknown references, and arity mismatches are
//! detected as soon as encountered and abort the entire execution. Data-level
//! problems are collected instead; see the validation subsystem.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for statement execution
pub type ExecResult<T> = Result<T, ExecError>;

/// Structural errors that abort execution immediately
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("Unknown table or CTE: {0}")]
    UnknownTable(String),

    #[error("Unknown column '{column}' on type '{type_name}'")]
    UnknownColumn { type_name: String, column: String },

    #[error("Unknown source alias: {0}")]
    UnknownSource(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {function} expects {expected} arguments, got {actual}")]
    FunctionArity {
        function: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("Insert row has {actual} values for {expected} columns")]
    InsertArity { expected: usize, actual: usize },

    #[error("Malformed statement: {0}")]
    Malformed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ExecError {
    /// Unknown-column error on the given type.
    pub fn unknown_column(type_name: impl Into<String>, column: impl Into<String>) -> Self {
        ExecError::UnknownColumn {
            type_name: type_name.into(),
            column: column.into(),
        }
    }

    /// Malformed-statement error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        ExecError::Malformed(reason.into())
    }
}
