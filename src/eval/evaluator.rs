//! Expression evaluation
//!
//! Tree-walks value expressions and boolean predicates against a single join
//! row, with a record group in scope for aggregates and the full row set for
//! window functions. Nested statements (scalar subqueries, IN-subqueries,
//! EXISTS) recurse synchronously through the statement executor with the
//! current row pushed onto the correlation stack.
//!
//! Type-mismatched operations are recorded as validation errors and evaluate
//! to null; they never abort the statement.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::ast::{
    AggregateFunc, BinaryOp, CaseBranch, CompareOp, Expr, InSet, Predicate, SortKey, Statement,
    UnaryOp, WindowFunc,
};
use crate::exec::{run_statement, ExecError, ExecResult, ExecutionContext, JoinRow};
use crate::validation::ValidationError;

use super::compare::{
    as_number, canonical_key, canonical_tuple_key, compare_values, number_value, type_name,
};
use super::functions::call_scalar;

/// Neutral score the similarity extension point yields until an external
/// scorer is wired in.
const NEUTRAL_SIMILARITY: f64 = 0.5;

/// Evaluation input: the row under evaluation, the aggregate group it
/// belongs to, and the full row set for window functions.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    pub row: &'a JoinRow,
    pub group: Option<&'a [JoinRow]>,
    pub window: Option<WindowInput<'a>>,
}

/// All rows of the current SELECT stage plus the current row's position.
#[derive(Clone, Copy)]
pub struct WindowInput<'a> {
    pub rows: &'a [JoinRow],
    pub index: usize,
}

impl<'a> Frame<'a> {
    /// Plain per-row frame.
    pub fn row(row: &'a JoinRow) -> Self {
        Self {
            row,
            group: None,
            window: None,
        }
    }

    /// Frame with an aggregate group in scope.
    pub fn grouped(row: &'a JoinRow, group: &'a [JoinRow]) -> Self {
        Self {
            row,
            group: Some(group),
            window: None,
        }
    }

    /// Frame with the full row set in scope for window functions.
    pub fn windowed(row: &'a JoinRow, rows: &'a [JoinRow], index: usize) -> Self {
        Self {
            row,
            group: None,
            window: Some(WindowInput { rows, index }),
        }
    }

    fn group_or_self(&self) -> Vec<JoinRow> {
        match self.group {
            Some(group) => group.to_vec(),
            None => vec![self.row.clone()],
        }
    }
}

/// Evaluates a value expression.
pub fn eval_expr(ctx: &mut ExecutionContext, frame: Frame<'_>, expr: &Expr) -> ExecResult<Value> {
    match expr {
        Expr::Literal { value } => Ok(value.clone()),

        Expr::Column { source, column } => {
            resolve_column(ctx, frame.row, source.as_deref(), column)
        }

        Expr::Binary { op, left, right } => {
            let left = eval_expr(ctx, frame, left)?;
            let right = eval_expr(ctx, frame, right)?;
            Ok(eval_binary(ctx, *op, &left, &right))
        }

        Expr::Unary { op, expr } => {
            let value = eval_expr(ctx, frame, expr)?;
            Ok(match op {
                UnaryOp::Negate => match (&value, as_number(&value)) {
                    (Value::Null, _) => Value::Null,
                    (_, Some(n)) => number_value(-n),
                    (other, None) => {
                        ctx.record_error(ValidationError::operator_mismatch(
                            "negate",
                            "number",
                            type_name(other),
                        ));
                        Value::Null
                    }
                },
            })
        }

        Expr::Case {
            branches,
            otherwise,
        } => eval_case(ctx, frame, branches, otherwise.as_deref()),

        Expr::Aggregate {
            func,
            arg,
            distinct,
        } => {
            let group = frame.group_or_self();
            eval_aggregate(ctx, *func, arg.as_deref(), *distinct, &group)
        }

        Expr::Window {
            func,
            arg,
            partition_by,
            order_by,
        } => eval_window(ctx, frame, *func, arg.as_deref(), partition_by, order_by),

        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(ctx, frame, arg)?);
            }
            call_scalar(ctx, function, &values)
        }

        Expr::Subquery { statement } => {
            let rows = correlated_rows(ctx, frame.row, statement)?;
            match rows.first() {
                Some(row) => Ok(single_column(row)?),
                None => Ok(Value::Null),
            }
        }

        Expr::Similarity { expr, query: _ } => {
            // Surface reference errors in the scored expression, then yield
            // the neutral default
            eval_expr(ctx, frame, expr)?;
            Ok(number_value(NEUTRAL_SIMILARITY))
        }
    }
}

/// Evaluates a boolean predicate. Null comparisons are false, AND/OR
/// short-circuit left to right.
pub fn eval_predicate(
    ctx: &mut ExecutionContext,
    frame: Frame<'_>,
    predicate: &Predicate,
) -> ExecResult<bool> {
    match predicate {
        Predicate::Compare { op, left, right } => {
            let left = eval_expr(ctx, frame, left)?;
            let right = eval_expr(ctx, frame, right)?;
            Ok(eval_compare(ctx, *op, &left, &right))
        }

        Predicate::In {
            expr,
            set,
            negated,
        } => {
            let value = eval_expr(ctx, frame, expr)?;
            if value.is_null() {
                return Ok(false);
            }
            let members = match set {
                InSet::Values { values } => {
                    let mut members = Vec::with_capacity(values.len());
                    for member in values {
                        members.push(eval_expr(ctx, frame, member)?);
                    }
                    members
                }
                InSet::Subquery { statement } => {
                    let rows = correlated_rows(ctx, frame.row, statement)?;
                    rows.iter()
                        .map(single_column)
                        .collect::<ExecResult<Vec<Value>>>()?
                }
            };
            let key = canonical_key(&value);
            let found = members
                .iter()
                .any(|member| !member.is_null() && canonical_key(member) == key);
            Ok(found != *negated)
        }

        Predicate::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = eval_expr(ctx, frame, expr)?;
            let low = eval_expr(ctx, frame, low)?;
            let high = eval_expr(ctx, frame, high)?;
            if value.is_null() || low.is_null() || high.is_null() {
                return Ok(false);
            }
            let in_range = compare_values(&value, &low) != Ordering::Less
                && compare_values(&value, &high) != Ordering::Greater;
            Ok(in_range != *negated)
        }

        Predicate::IsNull { expr, negated } => {
            let value = eval_expr(ctx, frame, expr)?;
            Ok(value.is_null() != *negated)
        }

        Predicate::Exists { statement, negated } => {
            let rows = correlated_rows(ctx, frame.row, statement)?;
            Ok(rows.is_empty() == *negated)
        }

        Predicate::And { operands } => {
            for operand in operands {
                if !eval_predicate(ctx, frame, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Predicate::Or { operands } => {
            for operand in operands {
                if eval_predicate(ctx, frame, operand)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        Predicate::Not { operand } => Ok(!eval_predicate(ctx, frame, operand)?),
    }
}

/// Resolves a column reference: the current row's aliases first, then the
/// correlation stack, innermost outer row first.
pub fn resolve_column(
    ctx: &ExecutionContext,
    row: &JoinRow,
    source: Option<&str>,
    column: &str,
) -> ExecResult<Value> {
    match source {
        Some(alias) => {
            if let Some(binding) = row.binding(alias) {
                check_declared(ctx, binding.type_name.as_deref(), column)?;
                return Ok(row.value_in(alias, column).unwrap_or(Value::Null));
            }
            for outer in ctx.outer_rows.iter().rev() {
                if let Some(binding) = outer.binding(alias) {
                    check_declared(ctx, binding.type_name.as_deref(), column)?;
                    return Ok(outer.value_in(alias, column).unwrap_or(Value::Null));
                }
            }
            Err(ExecError::UnknownSource(alias.to_string()))
        }
        None => {
            if let Some(value) = row.bare_value(column) {
                return Ok(value);
            }
            // Missing on every binding: a known primary type makes this a
            // structural error, a derived row makes it null
            match row.primary().and_then(|b| b.type_name.as_deref()) {
                Some(type_name) => {
                    check_declared(ctx, Some(type_name), column)?;
                    Ok(Value::Null)
                }
                None => Ok(Value::Null),
            }
        }
    }
}

fn check_declared(
    ctx: &ExecutionContext,
    type_name: Option<&str>,
    column: &str,
) -> ExecResult<()> {
    let Some(type_name) = type_name else {
        return Ok(());
    };
    if column == "*" || crate::schema::SchemaCatalog::is_system_column(column) {
        return Ok(());
    }
    if ctx.catalog.has_type(type_name) && ctx.catalog.field(type_name, column).is_none() {
        return Err(ExecError::unknown_column(type_name, column));
    }
    Ok(())
}

/// Runs a nested statement with the current row pushed onto the correlation
/// stack, restoring the stack afterwards.
fn correlated_rows(
    ctx: &mut ExecutionContext,
    row: &JoinRow,
    statement: &Statement,
) -> ExecResult<Vec<std::collections::BTreeMap<String, Value>>> {
    ctx.outer_rows.push(row.clone());
    let result = run_statement(ctx, statement);
    ctx.outer_rows.pop();
    Ok(result?.rows)
}

fn single_column(row: &std::collections::BTreeMap<String, Value>) -> ExecResult<Value> {
    if row.len() != 1 {
        return Err(ExecError::malformed(format!(
            "scalar subquery must project exactly one column, got {}",
            row.len()
        )));
    }
    Ok(row.values().next().cloned().unwrap_or(Value::Null))
}

fn eval_binary(ctx: &mut ExecutionContext, op: BinaryOp, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }

    // String concatenation through + stringifies the other side
    if op == BinaryOp::Add && (left.is_string() || right.is_string()) {
        return Value::String(format!("{}{}", stringify(left), stringify(right)));
    }

    let (Some(a), Some(b)) = (as_number(left), as_number(right)) else {
        ctx.record_error(ValidationError::operator_mismatch(
            binary_op_name(op),
            type_name(left),
            type_name(right),
        ));
        return Value::Null;
    };

    match op {
        BinaryOp::Add => number_value(a + b),
        BinaryOp::Subtract => number_value(a - b),
        BinaryOp::Multiply => number_value(a * b),
        BinaryOp::Divide => {
            if b == 0.0 {
                ctx.record_error(ValidationError::new(
                    "operator.divide",
                    "division by zero",
                ));
                Value::Null
            } else {
                number_value(a / b)
            }
        }
        BinaryOp::Modulo => {
            if b == 0.0 {
                ctx.record_error(ValidationError::new(
                    "operator.modulo",
                    "division by zero",
                ));
                Value::Null
            } else {
                number_value(a % b)
            }
        }
    }
}

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Subtract => "subtract",
        BinaryOp::Multiply => "multiply",
        BinaryOp::Divide => "divide",
        BinaryOp::Modulo => "modulo",
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval_compare(ctx: &mut ExecutionContext, op: CompareOp, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    if type_name(left) != type_name(right) {
        // Numbers still compare across integer/float representations; a
        // genuine family mismatch is a validation error
        ctx.record_error(ValidationError::operator_mismatch(
            compare_op_name(op),
            type_name(left),
            type_name(right),
        ));
        return false;
    }

    let ordering = compare_values(left, right);
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::GtEq => ordering != Ordering::Less,
    }
}

fn compare_op_name(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::NotEq => "not_eq",
        CompareOp::Lt => "lt",
        CompareOp::LtEq => "lt_eq",
        CompareOp::Gt => "gt",
        CompareOp::GtEq => "gt_eq",
    }
}

fn eval_case(
    ctx: &mut ExecutionContext,
    frame: Frame<'_>,
    branches: &[CaseBranch],
    otherwise: Option<&Expr>,
) -> ExecResult<Value> {
    for branch in branches {
        if eval_predicate(ctx, frame, &branch.when)? {
            return eval_expr(ctx, frame, &branch.then);
        }
    }
    match otherwise {
        Some(expr) => eval_expr(ctx, frame, expr),
        None => Ok(Value::Null),
    }
}

/// Evaluates an aggregate over a supplied record group.
pub fn eval_aggregate(
    ctx: &mut ExecutionContext,
    func: AggregateFunc,
    arg: Option<&Expr>,
    distinct: bool,
    group: &[JoinRow],
) -> ExecResult<Value> {
    // count(*) counts rows; every other shape needs the argument values
    if func == AggregateFunc::Count && arg.is_none() && !distinct {
        return Ok(Value::from(group.len()));
    }

    let mut values = Vec::with_capacity(group.len());
    for row in group {
        let value = match arg {
            Some(expr) => eval_expr(ctx, Frame::row(row), expr)?,
            None => Value::from(1),
        };
        if !value.is_null() {
            values.push(value);
        }
    }

    if distinct {
        let mut seen = BTreeSet::new();
        values.retain(|value| seen.insert(canonical_key(value)));
    }

    match func {
        AggregateFunc::Count => Ok(Value::from(values.len())),
        AggregateFunc::Sum | AggregateFunc::Avg => {
            let mut numbers = Vec::with_capacity(values.len());
            for value in &values {
                match as_number(value) {
                    Some(n) => numbers.push(n),
                    None => {
                        ctx.record_error(ValidationError::aggregate_numeric(
                            aggregate_name(func),
                            type_name(value),
                        ));
                        return Ok(if func == AggregateFunc::Sum {
                            Value::from(0)
                        } else {
                            Value::Null
                        });
                    }
                }
            }
            if func == AggregateFunc::Sum {
                Ok(number_value(numbers.iter().sum()))
            } else if numbers.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(number_value(
                    numbers.iter().sum::<f64>() / numbers.len() as f64,
                ))
            }
        }
        AggregateFunc::Min => Ok(values
            .into_iter()
            .min_by(|a, b| compare_values(a, b))
            .unwrap_or(Value::Null)),
        AggregateFunc::Max => Ok(values
            .into_iter()
            .max_by(|a, b| compare_values(a, b))
            .unwrap_or(Value::Null)),
    }
}

fn aggregate_name(func: AggregateFunc) -> &'static str {
    match func {
        AggregateFunc::Count => "count",
        AggregateFunc::Sum => "sum",
        AggregateFunc::Avg => "avg",
        AggregateFunc::Min => "min",
        AggregateFunc::Max => "max",
    }
}

fn eval_window(
    ctx: &mut ExecutionContext,
    frame: Frame<'_>,
    func: WindowFunc,
    arg: Option<&Expr>,
    partition_by: &[Expr],
    order_by: &[SortKey],
) -> ExecResult<Value> {
    let Some(window) = frame.window else {
        return Err(ExecError::malformed(
            "window function evaluated outside a row set",
        ));
    };

    // Partition membership by canonical key of the PARTITION BY tuple
    let mut keys = Vec::with_capacity(window.rows.len());
    for row in window.rows {
        let mut tuple = Vec::with_capacity(partition_by.len());
        for expr in partition_by {
            tuple.push(eval_expr(ctx, Frame::row(row), expr)?);
        }
        keys.push(canonical_tuple_key(&tuple));
    }
    let current_key = &keys[window.index];
    let members: Vec<usize> = (0..window.rows.len())
        .filter(|i| &keys[*i] == current_key)
        .collect();

    // Order keys within the partition, evaluated once per member
    let mut order_keys: Vec<(usize, Vec<Value>)> = Vec::with_capacity(members.len());
    for &member in &members {
        let mut tuple = Vec::with_capacity(order_by.len());
        for key in order_by {
            tuple.push(eval_expr(ctx, Frame::row(&window.rows[member]), &key.expr)?);
        }
        order_keys.push((member, tuple));
    }

    let compare_tuples = |a: &[Value], b: &[Value]| -> Ordering {
        for (key, (x, y)) in order_by.iter().zip(a.iter().zip(b.iter())) {
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
    };

    match func {
        WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank => {
            let mut ordered = order_keys.clone();
            ordered.sort_by(|(ai, a), (bi, b)| compare_tuples(a, b).then(ai.cmp(bi)));
            let position = ordered
                .iter()
                .position(|(member, _)| *member == window.index)
                .unwrap_or(0);

            let value = match func {
                WindowFunc::RowNumber => position + 1,
                WindowFunc::Rank => {
                    let current = &ordered[position].1;
                    1 + ordered
                        .iter()
                        .filter(|(_, key)| compare_tuples(key, current) == Ordering::Less)
                        .count()
                }
                WindowFunc::DenseRank => {
                    let current = &ordered[position].1;
                    let mut distinct_before = 0;
                    let mut previous: Option<&Vec<Value>> = None;
                    for (_, key) in &ordered {
                        if compare_tuples(key, current) != Ordering::Less {
                            break;
                        }
                        if previous.map_or(true, |p| compare_tuples(p, key) != Ordering::Equal) {
                            distinct_before += 1;
                        }
                        previous = Some(key);
                    }
                    distinct_before + 1
                }
                _ => unreachable!(),
            };
            Ok(Value::from(value))
        }

        WindowFunc::Count | WindowFunc::Sum | WindowFunc::Avg | WindowFunc::Min
        | WindowFunc::Max => {
            let partition: Vec<JoinRow> = members
                .iter()
                .map(|&i| window.rows[i].clone())
                .collect();
            let aggregate = match func {
                WindowFunc::Count => AggregateFunc::Count,
                WindowFunc::Sum => AggregateFunc::Sum,
                WindowFunc::Avg => AggregateFunc::Avg,
                WindowFunc::Min => AggregateFunc::Min,
                WindowFunc::Max => AggregateFunc::Max,
                _ => unreachable!(),
            };
            eval_aggregate(ctx, aggregate, arg, false, &partition)
        }
    }
}

/// Expands a wildcard column into the resolved record's full field map.
/// A projected `*` always refers to the local row; the correlation stack is
/// not consulted.
pub fn wildcard_map(row: &JoinRow, source: Option<&str>) -> ExecResult<Map<String, Value>> {
    let binding = match source {
        Some(alias) => row
            .binding(alias)
            .ok_or_else(|| ExecError::UnknownSource(alias.to_string()))?,
        None => row
            .primary()
            .ok_or_else(|| ExecError::malformed("wildcard over an empty row"))?,
    };

    let mut map = Map::new();
    if let Some(record) = &binding.record {
        for (name, value) in record.full_field_map() {
            map.insert(name, value);
        }
    }
    Ok(map)
}
