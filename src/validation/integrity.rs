//! Referential integrity over staged changes
//!
//! Runs after the statement tree has been fully walked and before any
//! external write. Two passes:
//!
//! 1. Delete cascades, iterated to a fixpoint: deletes staged by one
//!    cascade round are re-scanned in the next, so multi-hop relationship
//!    chains fully resolve. Restrict blocks with an error naming the
//!    referencer, cascade stages a delete of the referencer, setNull stages
//!    an update nulling the referencing field.
//! 2. Reference existence: every relationship value in a staged insert or
//!    update must match an id present in the referenced type's current view.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::exec::{ExecResult, ExecutionContext};
use crate::schema::{FieldKind, OnDeletePolicy};

use super::errors::ValidationError;

/// One relationship edge of the schema graph.
#[derive(Debug, Clone)]
struct RelationEdge {
    referencing_type: String,
    field: String,
    target_type: String,
    policy: OnDeletePolicy,
}

/// Runs both integrity passes over the context's staged changes.
pub fn enforce_integrity(ctx: &mut ExecutionContext) -> ExecResult<()> {
    let edges = relation_edges(ctx);
    process_cascades(ctx, &edges)?;
    check_reference_existence(ctx)?;
    Ok(())
}

/// Collects every relationship edge declared in the catalog, sorted for
/// deterministic processing order.
fn relation_edges(ctx: &ExecutionContext) -> Vec<RelationEdge> {
    let mut edges = Vec::new();
    for type_name in ctx.catalog.type_names() {
        let Some(definition) = ctx.catalog.type_definition(type_name) else {
            continue;
        };
        for field in &definition.fields {
            if let FieldKind::Relation { target, on_delete } = &field.kind {
                edges.push(RelationEdge {
                    referencing_type: type_name.to_lowercase(),
                    field: field.name.clone(),
                    target_type: target.to_lowercase(),
                    policy: *on_delete,
                });
            }
        }
    }
    edges.sort_by(|a, b| {
        (&a.referencing_type, &a.field).cmp(&(&b.referencing_type, &b.field))
    });
    edges
}

/// Cascade processing to a fixpoint over staged deletions.
fn process_cascades(ctx: &mut ExecutionContext, edges: &[RelationEdge]) -> ExecResult<()> {
    let mut processed: BTreeSet<(String, String)> = BTreeSet::new();

    loop {
        let mut pending: Vec<(String, String)> = Vec::new();
        for state in ctx.tables.dirty() {
            for id in &state.deleted {
                let key = (state.type_name.clone(), id.clone());
                if !processed.contains(&key) {
                    pending.push(key);
                }
            }
        }
        if pending.is_empty() {
            return Ok(());
        }
        pending.sort();

        for (deleted_type, deleted_id) in pending {
            processed.insert((deleted_type.clone(), deleted_id.clone()));

            for edge in edges.iter().filter(|e| e.target_type == deleted_type) {
                // Loading the referencing type here makes it part of the
                // query's touched set, so its staged cascades commit too
                let referencing: Vec<(String, Option<Value>)> = ctx
                    .tables
                    .state(&edge.referencing_type)?
                    .current
                    .iter()
                    .map(|record| (record.id.clone(), record.field(&edge.field).cloned()))
                    .collect();

                for (record_id, value) in referencing {
                    if value.as_ref().and_then(Value::as_str) != Some(deleted_id.as_str()) {
                        continue;
                    }
                    match edge.policy {
                        OnDeletePolicy::Restrict => {
                            ctx.errors.push(ValidationError::restrict_violation(
                                &deleted_type,
                                &deleted_id,
                                &edge.referencing_type,
                                &record_id,
                                &edge.field,
                            ));
                        }
                        OnDeletePolicy::Cascade => {
                            ctx.tables
                                .state(&edge.referencing_type)?
                                .stage_delete(&record_id);
                        }
                        OnDeletePolicy::SetNull => {
                            let mut changes = BTreeMap::new();
                            changes.insert(edge.field.clone(), Value::Null);
                            ctx.tables
                                .state(&edge.referencing_type)?
                                .stage_update(&record_id, changes);
                        }
                    }
                }
            }
        }
    }
}

/// Every relationship value staged by an insert or update must resolve to
/// an id in the referenced type's current view (staged inserts count,
/// staged deletes do not).
fn check_reference_existence(ctx: &mut ExecutionContext) -> ExecResult<()> {
    // (referencing type, record id, field, target type, value)
    let mut staged: Vec<(String, String, String, String, String)> = Vec::new();

    for state in ctx.tables.dirty() {
        let changesets = state
            .inserts
            .iter()
            .chain(state.updates.iter());
        for (record_id, fields) in changesets {
            for (field_name, value) in fields {
                let Some((target, _)) = ctx.catalog.relation(&state.type_name, field_name)
                else {
                    continue;
                };
                // Non-string relationship values were already flagged by the
                // per-value kind check
                if let Some(reference) = value.as_str() {
                    staged.push((
                        state.type_name.clone(),
                        record_id.clone(),
                        field_name.clone(),
                        target.to_lowercase(),
                        reference.to_string(),
                    ));
                }
            }
        }
    }
    staged.sort();

    for (type_name, record_id, field, target, reference) in staged {
        let exists = ctx
            .tables
            .state(&target)?
            .current
            .iter()
            .any(|record| record.id == reference);
        if !exists {
            ctx.errors.push(ValidationError::broken_reference(
                format!("{}[{}].{}", type_name, record_id, field),
                &target,
                &Value::String(reference),
            ));
        }
    }
    Ok(())
}
