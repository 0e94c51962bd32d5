//! Common table expressions
//!
//! CTEs execute in declaration order. Each one materializes its result rows
//! as read-only synthetic records addressable by case-insensitive name in
//! later CTEs and the final statement. Recursive CTEs seed from the
//! non-recursive term, then re-run the recursive term against the
//! accumulated rows until an iteration contributes nothing new or the hard
//! iteration ceiling is reached.

use std::collections::BTreeSet;

use crate::ast::{CommonTable, SetOp, Statement, WithStatement};
use crate::eval::canonical_row_key;
use crate::table::Record;

use super::context::ExecutionContext;
use super::errors::{ExecError, ExecResult};
use super::executor::run_statement;
use super::result::{OutputRow, StatementOutput};

/// Hard ceiling on recursive CTE iterations.
pub const MAX_RECURSIVE_ROUNDS: usize = 1000;

/// Executes a WITH wrapper: binds each CTE in order, runs the body, then
/// closes the scopes in reverse so shadowed names reappear.
pub fn run_with(ctx: &mut ExecutionContext, with: &WithStatement) -> ExecResult<StatementOutput> {
    let mut scopes: Vec<(String, Option<Vec<Record>>)> = Vec::new();

    let result = (|| {
        for cte in &with.ctes {
            let records = if cte.recursive {
                run_recursive(ctx, cte)?
            } else {
                materialize(ctx, &cte.statement)?
            };
            let previous = ctx.bind_cte(&cte.name, records);
            scopes.push((cte.name.clone(), previous));
        }
        run_statement(ctx, &with.body)
    })();

    for (name, previous) in scopes.into_iter().rev() {
        ctx.unbind_cte(&name, previous);
    }
    result
}

/// Runs a statement once and converts its rows into synthetic records.
fn materialize(ctx: &mut ExecutionContext, statement: &Statement) -> ExecResult<Vec<Record>> {
    let output = run_statement(ctx, statement)?;
    Ok(to_records(ctx, output.rows))
}

fn to_records(ctx: &mut ExecutionContext, rows: Vec<OutputRow>) -> Vec<Record> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let ordinal = ctx.next_synthetic();
        records.push(Record::synthetic(ordinal, row));
    }
    records
}

/// Fixpoint iteration for a recursive CTE.
///
/// The statement must be a UNION whose left branch is the seed and whose
/// right branch is the recursive term. Rows already accumulated (by
/// canonical key) do not count as new, which is what makes cyclic
/// parent-pointer walks terminate.
fn run_recursive(ctx: &mut ExecutionContext, cte: &CommonTable) -> ExecResult<Vec<Record>> {
    let Statement::Compound(compound) = &cte.statement else {
        return Err(ExecError::malformed(
            "recursive CTE must be a union of a seed term and a recursive term",
        ));
    };
    if compound.op != SetOp::Union {
        return Err(ExecError::malformed(
            "recursive CTE must combine its terms with union",
        ));
    }

    let seed = run_statement(ctx, &compound.left)?;
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut accumulated: Vec<OutputRow> = Vec::new();
    for row in seed.rows {
        if seen.insert(canonical_row_key(&row)) {
            accumulated.push(row);
        }
    }

    let previous = ctx.bind_cte(&cte.name, Vec::new());
    let outcome = (|| {
        let initial = to_records(ctx, accumulated.clone());
        ctx.bind_cte(&cte.name, initial);

        for _ in 0..MAX_RECURSIVE_ROUNDS {
            let round = run_statement(ctx, &compound.right)?;
            let mut fresh = Vec::new();
            for row in round.rows {
                if seen.insert(canonical_row_key(&row)) {
                    fresh.push(row);
                }
            }
            if fresh.is_empty() {
                break;
            }
            accumulated.extend(fresh);
            let rebound = to_records(ctx, accumulated.clone());
            ctx.bind_cte(&cte.name, rebound);
        }
        Ok(to_records(ctx, accumulated.clone()))
    })();

    ctx.unbind_cte(&cte.name, previous);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DataSource, Expr, Projection, SelectStatement, Statement};
    use crate::schema::SchemaCatalog;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(SchemaCatalog::new(vec![]), Arc::new(MemoryStore::new()))
    }

    fn empty_select() -> Statement {
        Statement::Select(SelectStatement {
            source: DataSource::table("nothing"),
            joins: vec![],
            projection: vec![Projection::named(Expr::literal(json!(1)), "one")],
            filter: None,
            group_by: vec![],
            having: None,
            distinct: false,
            order_by: vec![],
            limit: None,
            offset: None,
        })
    }

    #[test]
    fn test_non_recursive_cte_binds_and_unbinds() {
        let mut ctx = ctx();
        // "nothing" is neither a CTE nor a cataloged type
        let result = run_with(
            &mut ctx,
            &WithStatement {
                ctes: vec![CommonTable {
                    name: "numbers".into(),
                    recursive: false,
                    statement: empty_select(),
                }],
                body: Box::new(empty_select()),
            },
        );
        assert!(result.is_err());
        // The failed execution must not leak a CTE binding
        assert!(ctx.cte("numbers").is_none());
    }

    #[test]
    fn test_recursive_cte_requires_union_shape() {
        let mut ctx = ctx();
        let result = run_recursive(
            &mut ctx,
            &CommonTable {
                name: "walk".into(),
                recursive: true,
                statement: empty_select(),
            },
        );
        assert!(matches!(result, Err(ExecError::Malformed(_))));
    }
}
