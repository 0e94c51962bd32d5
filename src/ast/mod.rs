//! Statement and expression trees for stratadb
//!
//! Closed sum types with an explicit tag field for every AST family:
//! statements, data sources, value expressions, and boolean predicates.
//! Exhaustive matching over the tags replaces dynamic dispatch, so an
//! unhandled variant is a compile error when the grammar grows.

mod expr;
mod statement;

pub use expr::{
    AggregateFunc, BinaryOp, CaseBranch, CompareOp, Expr, InSet, Predicate, SortKey, UnaryOp,
    WindowFunc,
};
pub use statement::{
    Assignment, CommonTable, CompoundStatement, ConflictAction, DataSource, DeleteStatement,
    InsertStatement, Join, JoinKind, OnConflict, Projection, SelectStatement, SetOp, Statement,
    UpdateStatement, WithStatement,
};
