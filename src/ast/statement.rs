//! Statement trees
//!
//! The statement tree is the sole protocol at this crate's boundary: an
//! external planner produces it as a structured document and hands it in
//! verbatim. No textual SQL is parsed here.

use serde::{Deserialize, Serialize};

use super::expr::{Expr, Predicate, SortKey};

/// Join kinds, all evaluated by nested-loop matching in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

/// Set operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

/// Where rows come from: a named table (or in-scope CTE) or a nested SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// Table or CTE by case-insensitive name
    Table {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// Derived table
    Subquery {
        statement: Box<Statement>,
        alias: String,
    },
}

impl DataSource {
    /// Table source with the alias defaulted to the table name.
    pub fn table(name: impl Into<String>) -> Self {
        DataSource::Table {
            name: name.into(),
            alias: None,
        }
    }

    /// Table source under an explicit alias.
    pub fn table_as(name: impl Into<String>, alias: impl Into<String>) -> Self {
        DataSource::Table {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The alias this source binds rows under.
    pub fn binding(&self) -> &str {
        match self {
            DataSource::Table { name, alias } => alias.as_deref().unwrap_or(name),
            DataSource::Subquery { alias, .. } => alias,
        }
    }
}

/// One JOIN clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub source: DataSource,
    /// Join predicate, evaluated against the combined row
    pub on: Predicate,
}

/// One projected output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub expr: Expr,
    /// Output column name; derived from the expression when absent.
    /// Wildcard projections merge the whole field map instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Projection {
    /// Projection with a derived output name.
    pub fn expr(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    /// Projection under an explicit output name.
    pub fn named(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub source: DataSource,
    #[serde(default)]
    pub joins: Vec<Join>,
    pub projection: Vec<Projection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Predicate>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub order_by: Vec<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl SelectStatement {
    /// `SELECT * FROM table` starting point.
    pub fn from_table(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            projection: vec![Projection::expr(Expr::wildcard(name.clone()))],
            source: DataSource::table(name),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            distinct: false,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// Column assignment used by UPDATE and by ON CONFLICT DO UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: Expr) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// What to do when an insert collides on the conflict columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictAction {
    /// Skip the insert, leave the existing record untouched
    DoNothing,
    /// Stage an update of the existing record instead
    DoUpdate { assignments: Vec<Assignment> },
}

/// ON CONFLICT clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnConflict {
    /// Columns whose combined value identifies a conflict
    pub columns: Vec<String>,
    pub action: ConflictAction,
}

/// INSERT statement: literal rows or INSERT…SELECT, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    /// Literal value rows; each must match `columns` in arity
    #[serde(default)]
    pub rows: Vec<Vec<Expr>>,
    /// Nested SELECT producing the rows instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<SelectStatement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<OnConflict>,
    /// Evaluated against each staged record after insertion
    #[serde(default)]
    pub returning: Vec<Projection>,
}

/// UPDATE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub assignments: Vec<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    /// Evaluated against each record after its staged changes
    #[serde(default)]
    pub returning: Vec<Projection>,
}

/// DELETE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    /// Evaluated against each record's pre-deletion values
    #[serde(default)]
    pub returning: Vec<Projection>,
}

/// UNION / INTERSECT / EXCEPT over two statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundStatement {
    pub op: SetOp,
    /// Keep duplicates instead of deduplicating
    #[serde(default)]
    pub all: bool,
    pub left: Box<Statement>,
    pub right: Box<Statement>,
}

/// One named common table expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTable {
    /// Name later statements address the rows under (case-insensitive)
    pub name: String,
    #[serde(default)]
    pub recursive: bool,
    pub statement: Statement,
}

/// WITH wrapper: CTEs execute in declaration order, then the body runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithStatement {
    pub ctes: Vec<CommonTable>,
    pub body: Box<Statement>,
}

/// Top-level statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Compound(CompoundStatement),
    With(WithStatement),
}

impl Statement {
    /// True for statements that stage no changes.
    pub fn is_read_only(&self) -> bool {
        match self {
            Statement::Select(_) => true,
            Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => false,
            Statement::Compound(compound) => {
                compound.left.is_read_only() && compound.right.is_read_only()
            }
            Statement::With(with) => {
                with.ctes.iter().all(|cte| cte.statement.is_read_only())
                    && with.body.is_read_only()
            }
        }
    }
}
