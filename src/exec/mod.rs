//! Statement executor subsystem for stratadb
//!
//! Walks statement trees against a per-execution context: SELECT with
//! joins, grouping, windows, DISTINCT, ordering, and slicing; INSERT with
//! ON CONFLICT; UPDATE; DELETE; set operations; and CTEs with bounded
//! recursion. Mutations stage changes in the table cache; the commit
//! subsystem performs the only external writes.

mod context;
mod cte;
mod errors;
mod executor;
mod mutate;
mod result;
mod row;

pub use context::ExecutionContext;
pub use cte::MAX_RECURSIVE_ROUNDS;
pub use errors::{ExecError, ExecResult};
pub use executor::run_statement;
pub use result::{CommitCheck, OutputRow, PlannedQuery, QueryResult, StatementOutput, TableDelta};
pub use row::{Binding, JoinRow};
