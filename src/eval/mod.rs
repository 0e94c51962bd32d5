//! Expression evaluator subsystem for stratadb
//!
//! Evaluates value expressions and boolean predicates against join rows,
//! with aggregate groups and window row sets supplied by the statement
//! executor. Nested statements recurse synchronously through the executor.
//!
//! # Invariants
//!
//! - Evaluation is deterministic given fixed input rows
//! - Type mismatches collect validation errors and yield null, never abort
//! - Canonical keys decide equality for grouping, DISTINCT, and set ops

mod compare;
mod evaluator;
mod functions;

pub use compare::{
    canonical_key, canonical_row_key, canonical_tuple_key, compare_values, type_name,
};
pub use evaluator::{eval_aggregate, eval_expr, eval_predicate, wildcard_map, Frame, WindowInput};
pub use functions::parse_date;
