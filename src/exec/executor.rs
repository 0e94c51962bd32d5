//! Statement execution
//!
//! Walks the statement tree against the per-execution context. The SELECT
//! pipeline runs in strict order:
//!
//! 1. Resolve the FROM source (table, CTE by name, or subquery)
//! 2. Apply each JOIN via nested-loop matching against the join predicate
//! 3. Apply WHERE row by row
//! 4. Partition by GROUP BY keys and project per group (HAVING sees the
//!    full group), or collapse to one summary row when the projection
//!    aggregates without grouping; otherwise project per row
//! 5. DISTINCT dedups by canonical row serialization
//! 6. ORDER BY evaluates each sort key once per row, then sorts
//! 7. OFFSET/LIMIT slice the final sequence
//!
//! Execution is deterministic: the same statement against the same
//! snapshots yields the same row sequence.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::ast::{
    AggregateFunc, CompoundStatement, DataSource, Expr, Join, JoinKind, Projection,
    SelectStatement, SetOp, Statement,
};
use crate::eval::{
    canonical_row_key, canonical_tuple_key, compare_values, eval_expr, eval_predicate,
    wildcard_map, Frame,
};
use crate::table::Record;

use super::context::ExecutionContext;
use super::errors::{ExecError, ExecResult};
use super::result::{OutputRow, StatementOutput};
use super::row::JoinRow;
use super::{cte, mutate};

/// Executes any statement against the context.
pub fn run_statement(
    ctx: &mut ExecutionContext,
    statement: &Statement,
) -> ExecResult<StatementOutput> {
    match statement {
        Statement::Select(select) => run_select(ctx, select),
        Statement::Insert(insert) => mutate::run_insert(ctx, insert),
        Statement::Update(update) => mutate::run_update(ctx, update),
        Statement::Delete(delete) => mutate::run_delete(ctx, delete),
        Statement::Compound(compound) => run_compound(ctx, compound),
        Statement::With(with) => cte::run_with(ctx, with),
    }
}

/// One projected row paired with what produced it, so later pipeline stages
/// (HAVING already ran; DISTINCT and ORDER BY remain) can re-enter the
/// evaluator with the right scope.
struct DerivedRow {
    output: OutputRow,
    carrier: JoinRow,
    group: Option<Vec<JoinRow>>,
}

/// Runs the SELECT pipeline.
pub fn run_select(
    ctx: &mut ExecutionContext,
    select: &SelectStatement,
) -> ExecResult<StatementOutput> {
    // 1. FROM
    let mut rows = source_rows(ctx, &select.source)?;
    let mut shape = vec![(
        select.source.binding().to_string(),
        source_type(ctx, &select.source),
    )];

    // 2. JOINs in source order
    for join in &select.joins {
        rows = apply_join(ctx, rows, &shape, join)?;
        shape.push((
            join.source.binding().to_string(),
            source_type(ctx, &join.source),
        ));
    }

    // 3. WHERE
    if let Some(filter) = &select.filter {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if eval_predicate(ctx, Frame::row(&row), filter)? {
                kept.push(row);
            }
        }
        rows = kept;
    }

    // 4. GROUP BY / aggregate collapse / per-row projection
    let has_aggregate = select
        .projection
        .iter()
        .any(|p| p.expr.contains_aggregate());
    let has_window = select.projection.iter().any(|p| p.expr.contains_window());

    let mut derived: Vec<DerivedRow> = Vec::new();

    if !select.group_by.is_empty() {
        for group_rows in partition_rows(ctx, &rows, &select.group_by)? {
            let representative = group_rows[0].clone();
            if let Some(having) = &select.having {
                if !eval_predicate(ctx, Frame::grouped(&representative, &group_rows), having)? {
                    continue;
                }
            }
            let output = project(
                ctx,
                Frame::grouped(&representative, &group_rows),
                &select.projection,
            )?;
            derived.push(DerivedRow {
                output,
                carrier: representative,
                group: Some(group_rows),
            });
        }
    } else if has_aggregate || select.having.is_some() {
        // Whole input is one group; an empty source still yields the
        // aggregate-default row
        let representative = rows.first().cloned().unwrap_or_default();
        let include = match &select.having {
            Some(having) => eval_predicate(ctx, Frame::grouped(&representative, &rows), having)?,
            None => true,
        };
        if include {
            let output = project(
                ctx,
                Frame::grouped(&representative, &rows),
                &select.projection,
            )?;
            derived.push(DerivedRow {
                output,
                carrier: representative,
                group: Some(rows),
            });
        }
    } else {
        for index in 0..rows.len() {
            let frame = if has_window {
                Frame::windowed(&rows[index], &rows, index)
            } else {
                Frame::row(&rows[index])
            };
            let output = project(ctx, frame, &select.projection)?;
            derived.push(DerivedRow {
                output,
                carrier: rows[index].clone(),
                group: None,
            });
        }
    }

    // 5. DISTINCT
    if select.distinct {
        let mut seen = BTreeSet::new();
        derived.retain(|d| seen.insert(canonical_row_key(&d.output)));
    }

    // 6. ORDER BY, sort keys pre-evaluated once per row
    if !select.order_by.is_empty() {
        let mut keyed: Vec<(Vec<Value>, DerivedRow)> = Vec::with_capacity(derived.len());
        for d in derived {
            let sort_row = d.carrier.clone().with_binding(
                "__output",
                None,
                Some(Record::new("__output", d.output.clone())),
            );
            let mut keys = Vec::with_capacity(select.order_by.len());
            for key in &select.order_by {
                let frame = match &d.group {
                    Some(group) => Frame::grouped(&sort_row, group),
                    None => Frame::row(&sort_row),
                };
                keys.push(eval_expr(ctx, frame, &key.expr)?);
            }
            keyed.push((keys, d));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (key, (x, y)) in select.order_by.iter().zip(a.iter().zip(b.iter())) {
                let ordering = compare_values(x, y);
                let ordering = if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        derived = keyed.into_iter().map(|(_, d)| d).collect();
    }

    // 7. OFFSET / LIMIT
    let offset = select.offset.unwrap_or(0);
    let limit = select.limit.unwrap_or(usize::MAX);
    let outputs = derived
        .into_iter()
        .map(|d| d.output)
        .skip(offset)
        .take(limit)
        .collect();

    Ok(StatementOutput::rows(outputs))
}

/// Resolves a data source to single-binding rows: CTE by name first, then a
/// cataloged table, then error; subqueries materialize as synthetic records.
fn source_rows(ctx: &mut ExecutionContext, source: &DataSource) -> ExecResult<Vec<JoinRow>> {
    match source {
        DataSource::Table { name, alias } => {
            let binding = alias.as_deref().unwrap_or(name).to_string();
            if let Some(records) = ctx.cte(name).map(<[Record]>::to_vec) {
                return Ok(records
                    .into_iter()
                    .map(|record| JoinRow::single(&binding, None, record))
                    .collect());
            }
            if !ctx.catalog.has_type(name) {
                return Err(ExecError::UnknownTable(name.clone()));
            }
            let type_name = name.to_lowercase();
            let records = ctx.tables.state(&type_name)?.current.clone();
            Ok(records
                .into_iter()
                .map(|record| JoinRow::single(&binding, Some(type_name.clone()), record))
                .collect())
        }
        DataSource::Subquery { statement, alias } => {
            let output = run_statement(ctx, statement)?;
            Ok(output
                .rows
                .into_iter()
                .map(|row| {
                    let ordinal = ctx.next_synthetic();
                    JoinRow::single(alias, None, Record::synthetic(ordinal, row))
                })
                .collect())
        }
    }
}

/// Declared type a source binds, when it is a cataloged table.
fn source_type(ctx: &ExecutionContext, source: &DataSource) -> Option<String> {
    match source {
        DataSource::Table { name, .. } => {
            if ctx.cte(name).is_some() {
                None
            } else if ctx.catalog.has_type(name) {
                Some(name.to_lowercase())
            } else {
                None
            }
        }
        DataSource::Subquery { .. } => None,
    }
}

/// Nested-loop join. Left/right/full track per-side match state to emit
/// unmatched rows with the opposite side nulled.
fn apply_join(
    ctx: &mut ExecutionContext,
    left_rows: Vec<JoinRow>,
    left_shape: &[(String, Option<String>)],
    join: &Join,
) -> ExecResult<Vec<JoinRow>> {
    let right_alias = join.source.binding().to_string();
    let right_type = source_type(ctx, &join.source);
    let right_records: Vec<Record> = source_rows(ctx, &join.source)?
        .into_iter()
        .filter_map(|row| row.primary().and_then(|b| b.record.clone()))
        .collect();

    let mut combined = Vec::new();
    let mut right_matched = vec![false; right_records.len()];

    for left in &left_rows {
        let mut left_matched = false;
        for (right_index, right_record) in right_records.iter().enumerate() {
            let candidate = left.clone().with_binding(
                &right_alias,
                right_type.clone(),
                Some(right_record.clone()),
            );
            if eval_predicate(ctx, Frame::row(&candidate), &join.on)? {
                left_matched = true;
                right_matched[right_index] = true;
                combined.push(candidate);
            }
        }
        if !left_matched && matches!(join.kind, JoinKind::Left | JoinKind::Full) {
            combined.push(
                left.clone()
                    .with_binding(&right_alias, right_type.clone(), None),
            );
        }
    }

    if matches!(join.kind, JoinKind::Right | JoinKind::Full) {
        for (right_index, right_record) in right_records.iter().enumerate() {
            if right_matched[right_index] {
                continue;
            }
            let mut row = JoinRow::default();
            for (alias, type_name) in left_shape {
                row = row.with_binding(alias, type_name.clone(), None);
            }
            combined.push(row.with_binding(
                &right_alias,
                right_type.clone(),
                Some(right_record.clone()),
            ));
        }
    }

    Ok(combined)
}

/// Partitions rows by the evaluated GROUP BY key tuple, preserving first-
/// appearance order of groups.
fn partition_rows(
    ctx: &mut ExecutionContext,
    rows: &[JoinRow],
    group_by: &[Expr],
) -> ExecResult<Vec<Vec<JoinRow>>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<JoinRow>> = HashMap::new();

    for row in rows {
        let mut tuple = Vec::with_capacity(group_by.len());
        for expr in group_by {
            tuple.push(eval_expr(ctx, Frame::row(row), expr)?);
        }
        let key = canonical_tuple_key(&tuple);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row.clone());
    }

    Ok(order
        .into_iter()
        .map(|key| groups.remove(&key).expect("group recorded in order"))
        .collect())
}

/// Evaluates the projection list into an output row. Wildcards merge the
/// resolved record's full field map; later projections win name collisions,
/// so `alias.*` plus computed columns compose.
pub fn project(
    ctx: &mut ExecutionContext,
    frame: Frame<'_>,
    projection: &[Projection],
) -> ExecResult<OutputRow> {
    let mut row = OutputRow::new();
    for (index, item) in projection.iter().enumerate() {
        if let Expr::Column { source, column } = &item.expr {
            if column == "*" {
                for (name, value) in wildcard_map(frame.row, source.as_deref())? {
                    row.insert(name, value);
                }
                continue;
            }
        }
        let value = eval_expr(ctx, frame, &item.expr)?;
        row.insert(output_name(item, index), value);
    }
    Ok(row)
}

fn output_name(item: &Projection, index: usize) -> String {
    if let Some(alias) = &item.alias {
        return alias.clone();
    }
    match &item.expr {
        Expr::Column { column, .. } => column.clone(),
        Expr::Call { function, .. } => function.to_lowercase(),
        Expr::Aggregate { func, .. } => match func {
            AggregateFunc::Count => "count".to_string(),
            AggregateFunc::Sum => "sum".to_string(),
            AggregateFunc::Avg => "avg".to_string(),
            AggregateFunc::Min => "min".to_string(),
            AggregateFunc::Max => "max".to_string(),
        },
        _ => format!("column_{}", index + 1),
    }
}

/// Executes both branches independently, then combines by canonical row
/// equality, deduping unless ALL.
fn run_compound(
    ctx: &mut ExecutionContext,
    compound: &CompoundStatement,
) -> ExecResult<StatementOutput> {
    let left = run_statement(ctx, &compound.left)?;
    let right = run_statement(ctx, &compound.right)?;
    let affected = left.affected + right.affected;

    let rows = match compound.op {
        SetOp::Union => {
            let mut rows = left.rows;
            rows.extend(right.rows);
            if compound.all {
                rows
            } else {
                let mut seen = BTreeSet::new();
                rows.into_iter()
                    .filter(|row| seen.insert(canonical_row_key(row)))
                    .collect()
            }
        }
        SetOp::Intersect => {
            let mut counts = count_rows(&right.rows);
            let mut seen = BTreeSet::new();
            let mut out = Vec::new();
            for row in left.rows {
                let key = canonical_row_key(&row);
                let Some(count) = counts.get_mut(&key) else {
                    continue;
                };
                if *count == 0 {
                    continue;
                }
                if compound.all {
                    *count -= 1;
                    out.push(row);
                } else if seen.insert(key) {
                    out.push(row);
                }
            }
            out
        }
        SetOp::Except => {
            let mut counts = count_rows(&right.rows);
            let mut seen = BTreeSet::new();
            let mut out = Vec::new();
            for row in left.rows {
                let key = canonical_row_key(&row);
                if compound.all {
                    if let Some(count) = counts.get_mut(&key) {
                        if *count > 0 {
                            *count -= 1;
                            continue;
                        }
                    }
                    out.push(row);
                } else {
                    if counts.contains_key(&key) {
                        continue;
                    }
                    if seen.insert(key) {
                        out.push(row);
                    }
                }
            }
            out
        }
    };

    Ok(StatementOutput { rows, affected })
}

fn count_rows(rows: &[OutputRow]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        *counts.entry(canonical_row_key(row)).or_insert(0) += 1;
    }
    counts
}
