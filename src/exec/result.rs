//! Query results and staged deltas
//!
//! The plan pass produces a `PlannedQuery`: the caller-facing `QueryResult`
//! plus one `TableDelta` per touched type, each carrying the fingerprint the
//! commit coordinator re-verifies against live storage.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::ExecutionContext;
use crate::validation::ValidationError;

/// One projected output row.
pub type OutputRow = BTreeMap<String, Value>;

/// Raw output of executing one statement: projected rows and the count of
/// records the statement affected.
#[derive(Debug, Clone, Default)]
pub struct StatementOutput {
    pub rows: Vec<OutputRow>,
    pub affected: usize,
}

impl StatementOutput {
    /// Output with rows only (SELECT and set operations).
    pub fn rows(rows: Vec<OutputRow>) -> Self {
        Self { rows, affected: 0 }
    }
}

/// Caller-facing result of a query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Projected rows, in output order
    pub rows: Vec<OutputRow>,
    /// Number of records the statement affected
    pub affected: usize,
    /// Staged (or, after commit, durable) inserted ids per type
    pub inserted: BTreeMap<String, Vec<String>>,
    /// Updated ids per type
    pub updated: BTreeMap<String, Vec<String>>,
    /// Deleted ids per type
    pub deleted: BTreeMap<String, Vec<String>>,
    /// Every validation error collected during the pass
    pub errors: Vec<ValidationError>,
    /// False whenever any validation error exists
    pub can_commit: bool,
}

/// Staged changes for one type, snapshotted at plan time.
#[derive(Debug, Clone)]
pub struct TableDelta {
    /// Type name, lowercase
    pub type_name: String,
    /// Collection fingerprint when the snapshot was taken
    pub fingerprint: u32,
    /// Staged inserts by temporary id
    pub inserts: BTreeMap<String, BTreeMap<String, Value>>,
    /// Staged field changes by id
    pub updates: BTreeMap<String, BTreeMap<String, Value>>,
    /// Staged deletions
    pub deletes: BTreeSet<String>,
}

/// Plan-phase product: the result plus the deltas commit will apply.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub result: QueryResult,
    pub deltas: Vec<TableDelta>,
}

impl PlannedQuery {
    /// Assembles the plan product from a finished execution context.
    pub fn assemble(output: StatementOutput, ctx: ExecutionContext) -> Self {
        let mut inserted = BTreeMap::new();
        let mut updated = BTreeMap::new();
        let mut deleted = BTreeMap::new();
        let mut deltas = Vec::new();

        for state in ctx.tables.dirty() {
            if !state.inserts.is_empty() {
                inserted.insert(
                    state.type_name.clone(),
                    state.inserts.keys().cloned().collect(),
                );
            }
            if !state.updates.is_empty() {
                updated.insert(
                    state.type_name.clone(),
                    state.updates.keys().cloned().collect(),
                );
            }
            if !state.deleted.is_empty() {
                deleted.insert(
                    state.type_name.clone(),
                    state.deleted.iter().cloned().collect(),
                );
            }
            deltas.push(TableDelta {
                type_name: state.type_name.clone(),
                fingerprint: state.fingerprint,
                inserts: state.inserts.clone(),
                updates: state.updates.clone(),
                deletes: state.deleted.clone(),
            });
        }

        let can_commit = ctx.errors.is_empty();
        Self {
            result: QueryResult {
                rows: output.rows,
                affected: output.affected,
                inserted,
                updated,
                deleted,
                errors: ctx.errors,
                can_commit,
            },
            deltas,
        }
    }
}

/// Outcome of the pre-commit fingerprint check.
#[derive(Debug, Clone)]
pub struct CommitCheck {
    /// True when validation passed and no touched type changed
    pub allowed: bool,
    /// Types whose live fingerprint no longer matches the plan
    pub modified_tables: Vec<String>,
}
