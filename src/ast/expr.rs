//! Value and predicate expression trees
//!
//! Expressions arrive from the external planner as structured documents and
//! are never parsed from text. Each family is a closed, internally-tagged sum
//! type so the compiler flags unhandled variants when the grammar grows.
//!
//! Value expressions (`Expr`) and boolean predicates (`Predicate`) are kept
//! as separate families: a predicate is never a value and vice versa.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::statement::Statement;

/// Binary arithmetic operators.
///
/// `Add` doubles as string concatenation when either operand is a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation
    Negate,
}

/// Comparison operators for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Aggregate functions evaluated over a record group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Window functions evaluated per row over a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// One WHEN/THEN branch of a case expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    /// Branch condition
    pub when: Predicate,
    /// Value when the condition holds
    pub then: Expr,
}

/// A sort key: expression plus direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    /// Expression evaluated once per row before sorting
    pub expr: Expr,
    /// Sort descending instead of ascending
    #[serde(default)]
    pub descending: bool,
}

impl SortKey {
    /// Ascending sort on the given expression.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    /// Descending sort on the given expression.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

/// Value expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Constant value
    Literal {
        value: Value,
    },
    /// Column reference. `column` of `*` denotes all columns of the source;
    /// an absent source resolves against the row's primary alias first.
    Column {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        column: String,
    },
    /// Binary arithmetic / concatenation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operator
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// CASE WHEN … THEN … ELSE …, branches evaluated in order
    Case {
        branches: Vec<CaseBranch>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Expr>>,
    },
    /// Aggregate over the current group. `arg` of None means `count(*)`.
    Aggregate {
        func: AggregateFunc,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Box<Expr>>,
        #[serde(default)]
        distinct: bool,
    },
    /// Window function over a partition of the current row set
    Window {
        func: WindowFunc,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Box<Expr>>,
        #[serde(default)]
        partition_by: Vec<Expr>,
        #[serde(default)]
        order_by: Vec<SortKey>,
    },
    /// Scalar function call from the built-in library
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Scalar subquery: first column of the first result row, null if empty
    Subquery {
        statement: Box<Statement>,
    },
    /// Semantic similarity extension point. Yields a neutral score until an
    /// external scorer is wired in.
    Similarity {
        expr: Box<Expr>,
        query: String,
    },
}

impl Expr {
    /// Constant expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    /// Null constant.
    pub fn null() -> Self {
        Expr::Literal { value: Value::Null }
    }

    /// Column reference with an explicit source alias.
    pub fn column(source: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            source: Some(source.into()),
            column: column.into(),
        }
    }

    /// Bare column reference resolved against the primary alias.
    pub fn col(column: impl Into<String>) -> Self {
        Expr::Column {
            source: None,
            column: column.into(),
        }
    }

    /// Wildcard over all columns of the given source.
    pub fn wildcard(source: impl Into<String>) -> Self {
        Expr::Column {
            source: Some(source.into()),
            column: "*".into(),
        }
    }

    /// Binary operation.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Aggregate call, `arg` of None meaning `count(*)`.
    pub fn aggregate(func: AggregateFunc, arg: Option<Expr>) -> Self {
        Expr::Aggregate {
            func,
            arg: arg.map(Box::new),
            distinct: false,
        }
    }

    /// Scalar function call.
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            function: function.into(),
            args,
        }
    }

    /// True when this expression or any child contains an aggregate.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Literal { .. } | Expr::Column { .. } | Expr::Similarity { .. } => false,
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Unary { expr, .. } => expr.contains_aggregate(),
            Expr::Case {
                branches,
                otherwise,
            } => {
                branches.iter().any(|b| b.then.contains_aggregate())
                    || otherwise
                        .as_ref()
                        .is_some_and(|e| e.contains_aggregate())
            }
            Expr::Window { .. } => false,
            Expr::Call { args, .. } => args.iter().any(Expr::contains_aggregate),
            // Aggregates inside a subquery belong to the subquery's own scope
            Expr::Subquery { .. } => false,
        }
    }

    /// True when this expression or any child contains a window function.
    pub fn contains_window(&self) -> bool {
        match self {
            Expr::Window { .. } => true,
            Expr::Literal { .. }
            | Expr::Column { .. }
            | Expr::Similarity { .. }
            | Expr::Aggregate { .. }
            | Expr::Subquery { .. } => false,
            Expr::Binary { left, right, .. } => {
                left.contains_window() || right.contains_window()
            }
            Expr::Unary { expr, .. } => expr.contains_window(),
            Expr::Case {
                branches,
                otherwise,
            } => {
                branches.iter().any(|b| b.then.contains_window())
                    || otherwise.as_ref().is_some_and(|e| e.contains_window())
            }
            Expr::Call { args, .. } => args.iter().any(Expr::contains_window),
        }
    }
}

/// Membership set for IN predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InSet {
    /// Explicit value list
    Values { values: Vec<Expr> },
    /// First column of a nested statement's rows
    Subquery { statement: Box<Statement> },
}

/// Boolean predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Binary comparison
    Compare {
        op: CompareOp,
        left: Expr,
        right: Expr,
    },
    /// Membership test
    In {
        expr: Expr,
        set: InSet,
        #[serde(default)]
        negated: bool,
    },
    /// Range test, inclusive on both ends
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
        #[serde(default)]
        negated: bool,
    },
    /// Null test
    IsNull {
        expr: Expr,
        #[serde(default)]
        negated: bool,
    },
    /// Correlated existence test
    Exists {
        statement: Box<Statement>,
        #[serde(default)]
        negated: bool,
    },
    /// Conjunction, short-circuiting left to right
    And { operands: Vec<Predicate> },
    /// Disjunction, short-circuiting left to right
    Or { operands: Vec<Predicate> },
    /// Negation
    Not { operand: Box<Predicate> },
}

impl Predicate {
    /// Equality comparison.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Predicate::Compare {
            op: CompareOp::Eq,
            left,
            right,
        }
    }

    /// Inequality comparison.
    pub fn not_eq(left: Expr, right: Expr) -> Self {
        Predicate::Compare {
            op: CompareOp::NotEq,
            left,
            right,
        }
    }

    /// Strictly-greater comparison.
    pub fn gt(left: Expr, right: Expr) -> Self {
        Predicate::Compare {
            op: CompareOp::Gt,
            left,
            right,
        }
    }

    /// Strictly-less comparison.
    pub fn lt(left: Expr, right: Expr) -> Self {
        Predicate::Compare {
            op: CompareOp::Lt,
            left,
            right,
        }
    }

    /// Conjunction of the given predicates.
    pub fn and(operands: Vec<Predicate>) -> Self {
        Predicate::And { operands }
    }

    /// Disjunction of the given predicates.
    pub fn or(operands: Vec<Predicate>) -> Self {
        Predicate::Or { operands }
    }
}
