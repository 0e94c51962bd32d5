//! Two-phase commit coordination
//!
//! `plan` executes a statement without committing: all changes stage in
//! memory and the result carries per-type deltas with load-time
//! fingerprints. `commit` re-verifies every touched type's fingerprint
//! against live storage before writing anything, then applies the deltas
//! with one save per type, assigning durable identifiers to staged inserts.
//! A fingerprint mismatch rejects the whole commit; the caller re-plans.
//!
//! The coordinator performs the engine's only external writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::ast::Statement;
use crate::exec::{
    run_statement, CommitCheck, ExecResult, ExecutionContext, PlannedQuery, QueryResult,
    TableDelta,
};
use crate::observability::{Logger, Severity};
use crate::schema::{SchemaCatalog, SchemaProvider};
use crate::storage::DocumentStore;
use crate::table::{compute_fingerprint, Record};
use crate::validation::enforce_integrity;

use super::errors::{CommitError, CommitResult};

/// Entry point for the plan/commit cycle over one storage collaborator and
/// one schema provider.
pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
    schemas: Arc<dyn SchemaProvider>,
}

impl QueryEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(store: Arc<dyn DocumentStore>, schemas: Arc<dyn SchemaProvider>) -> Self {
        Self { store, schemas }
    }

    /// Executes the statement without committing: stages every change in
    /// memory, runs the integrity passes, and snapshots per-type deltas.
    ///
    /// Planning twice without committing is idempotent up to temporary ids.
    pub fn plan(&self, statement: &Statement) -> ExecResult<PlannedQuery> {
        let catalog = SchemaCatalog::new(self.schemas.type_definitions());
        let mut ctx = ExecutionContext::new(catalog, Arc::clone(&self.store));

        let output = run_statement(&mut ctx, statement)?;
        enforce_integrity(&mut ctx)?;

        let planned = PlannedQuery::assemble(output, ctx);
        Logger::log(
            Severity::Info,
            "query_planned",
            &[
                ("rows", planned.result.rows.len().to_string()),
                ("affected", planned.result.affected.to_string()),
                ("errors", planned.result.errors.len().to_string()),
                ("types", delta_names(&planned.deltas)),
            ],
        );
        Ok(planned)
    }

    /// Re-verifies every touched type's fingerprint against live storage.
    pub fn check(&self, planned: &PlannedQuery) -> CommitResult<CommitCheck> {
        let modified = self.modified_tables(&planned.deltas)?;
        Ok(CommitCheck {
            allowed: planned.result.can_commit && modified.is_empty(),
            modified_tables: modified,
        })
    }

    /// Applies a planned query's deltas: refuses on validation errors or
    /// fingerprint drift, otherwise persists one save per type and returns
    /// the result with durable identifiers.
    pub fn commit(&self, planned: PlannedQuery) -> CommitResult<QueryResult> {
        if !planned.result.can_commit {
            Logger::log_stderr(
                Severity::Warn,
                "commit_rejected",
                &[(
                    "validation_errors",
                    planned.result.errors.len().to_string(),
                )],
            );
            return Err(CommitError::Validation {
                errors: planned.result.errors,
            });
        }

        // Validate every precondition before writing any type
        let modified = self.modified_tables(&planned.deltas)?;
        if !modified.is_empty() {
            Logger::log_stderr(
                Severity::Warn,
                "commit_rejected",
                &[("modified_tables", modified.join(","))],
            );
            return Err(CommitError::Conflict {
                modified_tables: modified,
            });
        }

        // Durable ids for every staged insert, assigned up front so
        // relationship values can remap across types
        let mut id_map: BTreeMap<String, String> = BTreeMap::new();
        for delta in &planned.deltas {
            for temp_id in delta.inserts.keys() {
                id_map.insert(temp_id.clone(), Uuid::new_v4().to_string());
            }
        }

        for delta in &planned.deltas {
            let mut corruption: Option<String> = None;
            self.store.save(&delta.type_name, &mut |records| {
                // Defensive invariant: a matching fingerprint means every
                // updated/deleted id is still present
                for id in delta.updates.keys().chain(delta.deletes.iter()) {
                    if !records.iter().any(|r| &r.id == id) {
                        corruption = Some(format!(
                            "record '{}' of type '{}' vanished under a matching fingerprint",
                            id, delta.type_name
                        ));
                        return;
                    }
                }

                for (temp_id, fields) in &delta.inserts {
                    if let Some(durable) = id_map.get(temp_id) {
                        records.push(Record::new(durable, remap_fields(fields, &id_map)));
                    }
                }
                for (id, changes) in &delta.updates {
                    if let Some(record) = records.iter_mut().find(|r| &r.id == id) {
                        record.apply_changes(&remap_fields(changes, &id_map));
                    }
                }
                records.retain(|record| !delta.deletes.contains(&record.id));
            })?;
            if let Some(reason) = corruption {
                Logger::log_stderr(Severity::Error, "commit_corruption", &[("reason", reason.clone())]);
                return Err(CommitError::StateCorruption(reason));
            }
        }

        let mut result = planned.result;
        for ids in result.inserted.values_mut() {
            for id in ids.iter_mut() {
                if let Some(durable) = id_map.get(id) {
                    *id = durable.clone();
                }
            }
        }
        for row in &mut result.rows {
            for value in row.values_mut() {
                if let Value::String(s) = value {
                    if let Some(durable) = id_map.get(s) {
                        *value = Value::String(durable.clone());
                    }
                }
            }
        }

        Logger::log(
            Severity::Info,
            "commit_applied",
            &[
                ("affected", result.affected.to_string()),
                ("types", delta_names(&planned.deltas)),
            ],
        );
        Ok(result)
    }

    /// Plans and commits in one call. Read-only statements skip the commit
    /// phase outright.
    pub fn execute(&self, statement: &Statement) -> CommitResult<QueryResult> {
        let planned = self.plan(statement)?;
        if planned.deltas.is_empty() {
            return Ok(planned.result);
        }
        self.commit(planned)
    }

    fn modified_tables(&self, deltas: &[TableDelta]) -> CommitResult<Vec<String>> {
        let mut modified = Vec::new();
        for delta in deltas {
            let records = self.store.load(&delta.type_name)?;
            if compute_fingerprint(&records) != delta.fingerprint {
                modified.push(delta.type_name.clone());
            }
        }
        Ok(modified)
    }
}

fn delta_names(deltas: &[TableDelta]) -> String {
    deltas
        .iter()
        .map(|d| d.type_name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Rewrites staged relationship values that point at temporary insert ids
/// to their durable counterparts.
fn remap_fields(
    fields: &BTreeMap<String, Value>,
    id_map: &BTreeMap<String, String>,
) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => match id_map.get(s) {
                    Some(durable) => Value::String(durable.clone()),
                    None => value.clone(),
                },
                other => other.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, InsertStatement, SelectStatement, Statement};
    use crate::schema::{FieldDefinition, TypeDefinition};
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn engine() -> (Arc<MemoryStore>, QueryEngine) {
        let store = Arc::new(MemoryStore::new());
        let types = vec![TypeDefinition::new(
            "users",
            vec![
                FieldDefinition::string("name"),
                FieldDefinition::number("age").optional(),
            ],
        )];
        let engine = QueryEngine::new(store.clone(), Arc::new(move || types.clone()));
        (store, engine)
    }

    fn insert_user(name: &str, age: i64) -> Statement {
        Statement::Insert(InsertStatement {
            table: "users".into(),
            columns: vec!["name".into(), "age".into()],
            rows: vec![vec![
                Expr::literal(json!(name)),
                Expr::literal(json!(age)),
            ]],
            source: None,
            on_conflict: None,
            returning: vec![],
        })
    }

    #[test]
    fn test_plan_stages_without_writing() {
        let (store, engine) = engine();
        let planned = engine.plan(&insert_user("Alice", 30)).unwrap();

        assert_eq!(planned.result.affected, 1);
        assert!(planned.result.can_commit);
        assert!(store.snapshot("users").is_empty());
    }

    #[test]
    fn test_commit_assigns_durable_ids() {
        let (store, engine) = engine();
        let planned = engine.plan(&insert_user("Alice", 30)).unwrap();
        let result = engine.commit(planned).unwrap();

        let durable = &result.inserted["users"][0];
        assert!(!durable.starts_with("pending:"));

        let records = store.snapshot("users");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, *durable);
        assert_eq!(records[0].field("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_conflict_detected_between_plan_and_commit() {
        let (store, engine) = engine();
        let planned = engine.plan(&insert_user("Alice", 30)).unwrap();

        // External writer lands between plan and commit
        store
            .save("users", &mut |records| {
                records.push(Record::new("external", std::collections::BTreeMap::new()));
            })
            .unwrap();

        let check = engine.check(&planned).unwrap();
        assert!(!check.allowed);
        assert_eq!(check.modified_tables, vec!["users".to_string()]);

        match engine.commit(planned) {
            Err(CommitError::Conflict { modified_tables }) => {
                assert_eq!(modified_tables, vec!["users".to_string()]);
            }
            other => panic!("expected conflict, got {:?}", other.map(|r| r.affected)),
        }
    }

    #[test]
    fn test_validation_errors_refuse_commit() {
        let (_store, engine) = engine();
        // Missing required "name"
        let statement = Statement::Insert(InsertStatement {
            table: "users".into(),
            columns: vec!["age".into()],
            rows: vec![vec![Expr::literal(json!(30))]],
            source: None,
            on_conflict: None,
            returning: vec![],
        });

        let planned = engine.plan(&statement).unwrap();
        assert!(!planned.result.can_commit);
        assert!(matches!(
            engine.commit(planned),
            Err(CommitError::Validation { .. })
        ));
    }

    #[test]
    fn test_execute_skips_commit_for_reads() {
        let (_store, engine) = engine();
        engine.execute(&insert_user("Alice", 30)).unwrap();

        let result = engine
            .execute(&Statement::Select(SelectStatement::from_table("users")))
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert!(result.can_commit);
    }
}
