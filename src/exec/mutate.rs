//! Mutating statements
//!
//! INSERT, UPDATE, and DELETE stage their changes in the table cache; no
//! storage write happens here. Every value written is checked against the
//! schema catalog (type, enum membership, requiredness) with problems
//! collected as validation errors. RETURNING evaluates against the staged
//! post-change record; DELETE captures pre-deletion values.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::{
    Assignment, ConflictAction, DeleteStatement, InsertStatement, UpdateStatement,
};
use crate::eval::{canonical_key, eval_expr, eval_predicate, Frame};
use crate::table::Record;
use crate::validation::{check_assignment, ValidationError};

use super::context::ExecutionContext;
use super::errors::{ExecError, ExecResult};
use super::executor::{project, run_select};
use super::result::{OutputRow, StatementOutput};
use super::row::JoinRow;

/// Executes an INSERT: literal rows or INSERT…SELECT, with optional ON
/// CONFLICT handling.
pub fn run_insert(ctx: &mut ExecutionContext, insert: &InsertStatement) -> ExecResult<StatementOutput> {
    let type_name = insert.table.to_lowercase();
    if !ctx.catalog.has_type(&type_name) {
        return Err(ExecError::UnknownTable(insert.table.clone()));
    }
    for column in &insert.columns {
        if ctx.catalog.field(&type_name, column).is_none() {
            return Err(ExecError::unknown_column(&type_name, column));
        }
    }

    let candidates = insert_candidates(ctx, insert, &type_name)?;

    let mut affected = 0;
    let mut rows_out: Vec<OutputRow> = Vec::new();

    for mut candidate in candidates {
        apply_defaults(ctx, &type_name, &mut candidate);
        validate_record_fields(ctx, &type_name, &candidate);

        // ON CONFLICT: an existing record matching on the conflict columns
        // is skipped or updated instead of inserting
        let target = conflict_target(ctx, insert, &type_name, &candidate)?;
        let staged_id = match (target, &insert.on_conflict) {
            (Some(_), Some(clause)) if clause.action == ConflictAction::DoNothing => continue,
            (Some(existing), Some(clause)) => {
                let ConflictAction::DoUpdate { assignments } = &clause.action else {
                    continue;
                };
                let row =
                    JoinRow::single(&insert.table, Some(type_name.clone()), existing.clone());
                let changes = eval_assignments(ctx, &row, assignments, &type_name)?;
                ctx.tables.state(&type_name)?.stage_update(&existing.id, changes);
                existing.id
            }
            _ => {
                let state = ctx.tables.state(&type_name)?;
                let temp_id = state.next_temp_id();
                state.stage_insert(&temp_id, candidate);
                temp_id
            }
        };
        affected += 1;

        if !insert.returning.is_empty() {
            rows_out.push(returning_row(ctx, &type_name, &insert.table, &staged_id, &insert.returning)?);
        }
    }

    Ok(StatementOutput {
        rows: rows_out,
        affected,
    })
}

/// Executes an UPDATE: predicates matched over the type's current records,
/// SET expressions evaluated per record.
pub fn run_update(ctx: &mut ExecutionContext, update: &UpdateStatement) -> ExecResult<StatementOutput> {
    let type_name = update.table.to_lowercase();
    if !ctx.catalog.has_type(&type_name) {
        return Err(ExecError::UnknownTable(update.table.clone()));
    }
    let binding = update.alias.clone().unwrap_or_else(|| update.table.clone());
    let records = ctx.tables.state(&type_name)?.current.clone();

    let mut affected = 0;
    let mut rows_out: Vec<OutputRow> = Vec::new();

    for record in records {
        let row = JoinRow::single(&binding, Some(type_name.clone()), record.clone());
        let matched = match &update.filter {
            Some(filter) => eval_predicate(ctx, Frame::row(&row), filter)?,
            None => true,
        };
        if !matched {
            continue;
        }

        let changes = eval_assignments(ctx, &row, &update.assignments, &type_name)?;
        if !ctx.tables.state(&type_name)?.stage_update(&record.id, changes) {
            continue;
        }
        affected += 1;

        if !update.returning.is_empty() {
            rows_out.push(returning_row(ctx, &type_name, &binding, &record.id, &update.returning)?);
        }
    }

    Ok(StatementOutput {
        rows: rows_out,
        affected,
    })
}

/// Executes a DELETE, capturing RETURNING values before removal.
pub fn run_delete(ctx: &mut ExecutionContext, delete: &DeleteStatement) -> ExecResult<StatementOutput> {
    let type_name = delete.table.to_lowercase();
    if !ctx.catalog.has_type(&type_name) {
        return Err(ExecError::UnknownTable(delete.table.clone()));
    }
    let binding = delete.alias.clone().unwrap_or_else(|| delete.table.clone());
    let records = ctx.tables.state(&type_name)?.current.clone();

    let mut affected = 0;
    let mut rows_out: Vec<OutputRow> = Vec::new();

    for record in records {
        let row = JoinRow::single(&binding, Some(type_name.clone()), record.clone());
        let matched = match &delete.filter {
            Some(filter) => eval_predicate(ctx, Frame::row(&row), filter)?,
            None => true,
        };
        if !matched {
            continue;
        }

        // Pre-deletion values for RETURNING
        let returned = if delete.returning.is_empty() {
            None
        } else {
            Some(project(ctx, Frame::row(&row), &delete.returning)?)
        };

        if !ctx.tables.state(&type_name)?.stage_delete(&record.id) {
            continue;
        }
        affected += 1;
        if let Some(row) = returned {
            rows_out.push(row);
        }
    }

    Ok(StatementOutput {
        rows: rows_out,
        affected,
    })
}

/// Builds the candidate field maps an INSERT will stage: literal rows
/// evaluated positionally against the column list, or INSERT…SELECT rows
/// matched by column name.
fn insert_candidates(
    ctx: &mut ExecutionContext,
    insert: &InsertStatement,
    type_name: &str,
) -> ExecResult<Vec<BTreeMap<String, Value>>> {
    let mut candidates = Vec::new();

    match &insert.source {
        Some(select) => {
            if !insert.rows.is_empty() {
                return Err(ExecError::malformed(
                    "insert cannot have both literal rows and a select source",
                ));
            }
            let output = run_select(ctx, select)?;
            for row in output.rows {
                candidates.push(candidate_from_named_row(ctx, insert, type_name, row)?);
            }
        }
        None => {
            if insert.rows.is_empty() {
                return Err(ExecError::malformed(
                    "insert requires literal rows or a select source",
                ));
            }
            if insert.columns.is_empty() {
                return Err(ExecError::malformed(
                    "insert with literal rows requires a column list",
                ));
            }
            let empty = JoinRow::default();
            for row in &insert.rows {
                if row.len() != insert.columns.len() {
                    return Err(ExecError::InsertArity {
                        expected: insert.columns.len(),
                        actual: row.len(),
                    });
                }
                let mut fields = BTreeMap::new();
                for (column, expr) in insert.columns.iter().zip(row.iter()) {
                    let declared = ctx
                        .catalog
                        .field(type_name, column)
                        .map(|f| f.name.clone())
                        .expect("columns checked before candidate construction");
                    let value = eval_expr(ctx, Frame::row(&empty), expr)?;
                    fields.insert(declared, value);
                }
                candidates.push(fields);
            }
        }
    }

    Ok(candidates)
}

/// Maps one SELECT output row onto the insert columns by case-insensitive
/// name. With no explicit column list, every non-system output column must
/// be declared on the target type.
fn candidate_from_named_row(
    ctx: &ExecutionContext,
    insert: &InsertStatement,
    type_name: &str,
    row: OutputRow,
) -> ExecResult<BTreeMap<String, Value>> {
    let mut fields = BTreeMap::new();
    if insert.columns.is_empty() {
        for (name, value) in row {
            if crate::schema::SchemaCatalog::is_system_column(&name) {
                continue;
            }
            let Some(field) = ctx.catalog.field(type_name, &name) else {
                return Err(ExecError::unknown_column(type_name, &name));
            };
            fields.insert(field.name.clone(), value);
        }
    } else {
        for column in &insert.columns {
            let declared = ctx
                .catalog
                .field(type_name, column)
                .map(|f| f.name.clone())
                .expect("columns checked before candidate construction");
            let value = row
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null);
            fields.insert(declared, value);
        }
    }
    Ok(fields)
}

/// Fills declared defaults into a candidate that omits them.
fn apply_defaults(ctx: &ExecutionContext, type_name: &str, candidate: &mut BTreeMap<String, Value>) {
    let Some(definition) = ctx.catalog.type_definition(type_name) else {
        return;
    };
    for field in &definition.fields {
        if candidate.contains_key(&field.name) {
            continue;
        }
        if let Some(default) = &field.default {
            candidate.insert(field.name.clone(), default.clone());
        }
    }
}

/// Type-checks every provided value and flags missing required fields.
fn validate_record_fields(
    ctx: &mut ExecutionContext,
    type_name: &str,
    candidate: &BTreeMap<String, Value>,
) {
    let Some(definition) = ctx.catalog.type_definition(type_name).cloned() else {
        return;
    };
    for field in &definition.fields {
        let path = format!("{}.{}", type_name, field.name);
        match candidate.get(&field.name) {
            Some(value) => {
                if value.is_null() {
                    if field.is_required() {
                        ctx.errors.push(ValidationError::missing_required(path));
                    }
                } else if let Some(error) = check_assignment(field, value, &path) {
                    ctx.errors.push(error);
                }
            }
            None => {
                if field.is_required() {
                    ctx.errors.push(ValidationError::missing_required(path));
                }
            }
        }
    }
}

/// Finds an existing record whose conflict-column values match the
/// candidate's, by canonical serialization.
fn conflict_target(
    ctx: &mut ExecutionContext,
    insert: &InsertStatement,
    type_name: &str,
    candidate: &BTreeMap<String, Value>,
) -> ExecResult<Option<Record>> {
    let Some(on_conflict) = &insert.on_conflict else {
        return Ok(None);
    };
    let mut declared_columns = Vec::with_capacity(on_conflict.columns.len());
    for column in &on_conflict.columns {
        let Some(field) = ctx.catalog.field(type_name, column) else {
            return Err(ExecError::unknown_column(type_name, column));
        };
        declared_columns.push(field.name.clone());
    }

    let candidate_keys: Vec<String> = declared_columns
        .iter()
        .map(|column| canonical_key(candidate.get(column).unwrap_or(&Value::Null)))
        .collect();

    let state = ctx.tables.state(type_name)?;
    Ok(state
        .current
        .iter()
        .find(|record| {
            declared_columns
                .iter()
                .zip(candidate_keys.iter())
                .all(|(column, key)| &canonical_key(&record.value_of(column)) == key)
        })
        .cloned())
}

/// Evaluates SET-style assignments against one record's row, type-checking
/// each value. Shared by UPDATE and ON CONFLICT DO UPDATE.
fn eval_assignments(
    ctx: &mut ExecutionContext,
    row: &JoinRow,
    assignments: &[Assignment],
    type_name: &str,
) -> ExecResult<BTreeMap<String, Value>> {
    let mut changes = BTreeMap::new();
    for assignment in assignments {
        let Some(field) = ctx.catalog.field(type_name, &assignment.column).cloned() else {
            return Err(ExecError::unknown_column(type_name, &assignment.column));
        };
        let value = eval_expr(ctx, Frame::row(row), &assignment.value)?;
        let path = format!("{}.{}", type_name, field.name);
        if value.is_null() {
            if field.is_required() {
                ctx.errors.push(ValidationError::missing_required(path));
            }
        } else if let Some(error) = check_assignment(&field, &value, &path) {
            ctx.errors.push(error);
        }
        changes.insert(field.name.clone(), value);
    }
    Ok(changes)
}

/// Evaluates a RETURNING projection against the staged record.
fn returning_row(
    ctx: &mut ExecutionContext,
    type_name: &str,
    binding: &str,
    id: &str,
    returning: &[crate::ast::Projection],
) -> ExecResult<OutputRow> {
    let record = ctx
        .tables
        .state(type_name)?
        .record(id)
        .cloned()
        .ok_or_else(|| ExecError::malformed(format!("staged record '{}' vanished", id)))?;
    let row = JoinRow::single(binding, Some(type_name.to_string()), record);
    project(ctx, Frame::row(&row), returning)
}
