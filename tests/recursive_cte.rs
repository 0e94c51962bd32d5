//! Common table expression invariants
//!
//! Non-recursive CTEs materialize once and are addressable by name in later
//! CTEs and the final statement. Recursive CTEs seed from the initial term
//! and iterate the recursive term until a round contributes no new rows
//! (by canonical row key) or the hard iteration ceiling is reached.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use stratadb::ast::{
    BinaryOp, CommonTable, CompoundStatement, DataSource, Expr, Join, JoinKind, Predicate,
    Projection, SelectStatement, SetOp, SortKey, Statement, WithStatement,
};
use stratadb::commit::QueryEngine;
use stratadb::exec::MAX_RECURSIVE_ROUNDS;
use stratadb::schema::{FieldDefinition, OnDeletePolicy, TypeDefinition};
use stratadb::storage::MemoryStore;
use stratadb::table::Record;

fn record(id: &str, pairs: &[(&str, serde_json::Value)]) -> Record {
    let fields: BTreeMap<String, serde_json::Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Record::new(id, fields)
}

fn employees_engine(edges: &[(&str, serde_json::Value)]) -> QueryEngine {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "employees",
        edges
            .iter()
            .map(|(id, parent)| record(id, &[("parent", parent.clone())]))
            .collect(),
    );
    let types = vec![TypeDefinition::new(
        "employees",
        vec![FieldDefinition::relation("parent", "employees", OnDeletePolicy::SetNull).optional()],
    )];
    QueryEngine::new(store, Arc::new(move || types.clone()))
}

fn select(
    source: DataSource,
    joins: Vec<Join>,
    projection: Vec<Projection>,
    filter: Option<Predicate>,
    order_by: Vec<SortKey>,
) -> SelectStatement {
    SelectStatement {
        source,
        joins,
        projection,
        filter,
        group_by: vec![],
        having: None,
        distinct: false,
        order_by,
        limit: None,
        offset: None,
    }
}

/// WITH RECURSIVE ancestors AS (
///   SELECT id AS node, parent AS next, 0 AS level FROM employees WHERE id = seed
///   UNION
///   SELECT e.id, e.parent, a.level + 1 FROM ancestors a JOIN employees e ON e.id = a.next
/// ) SELECT node, level FROM ancestors ORDER BY level
fn ancestor_walk(seed: &str) -> Statement {
    let seed_term = Statement::Select(select(
        DataSource::table("employees"),
        vec![],
        vec![
            Projection::named(Expr::col("id"), "node"),
            Projection::named(Expr::col("parent"), "next"),
            Projection::named(Expr::literal(json!(0)), "level"),
        ],
        Some(Predicate::eq(Expr::col("id"), Expr::literal(json!(seed)))),
        vec![],
    ));

    let recursive_term = Statement::Select(select(
        DataSource::table_as("ancestors", "a"),
        vec![Join {
            kind: JoinKind::Inner,
            source: DataSource::table_as("employees", "e"),
            on: Predicate::eq(Expr::column("e", "id"), Expr::column("a", "next")),
        }],
        vec![
            Projection::named(Expr::column("e", "id"), "node"),
            Projection::named(Expr::column("e", "parent"), "next"),
            Projection::named(
                Expr::binary(
                    BinaryOp::Add,
                    Expr::column("a", "level"),
                    Expr::literal(json!(1)),
                ),
                "level",
            ),
        ],
        None,
        vec![],
    ));

    Statement::With(WithStatement {
        ctes: vec![CommonTable {
            name: "ancestors".into(),
            recursive: true,
            statement: Statement::Compound(CompoundStatement {
                op: SetOp::Union,
                all: false,
                left: Box::new(seed_term),
                right: Box::new(recursive_term),
            }),
        }],
        body: Box::new(Statement::Select(select(
            DataSource::table("ancestors"),
            vec![],
            vec![
                Projection::expr(Expr::col("node")),
                Projection::expr(Expr::col("level")),
            ],
            None,
            vec![SortKey::asc(Expr::col("level"))],
        ))),
    })
}

#[test]
fn test_ancestor_walk_collects_each_ancestor_once() {
    // e3 -> e2 -> e1, root has no parent
    let engine = employees_engine(&[
        ("e1", json!(null)),
        ("e2", json!("e1")),
        ("e3", json!("e2")),
    ]);

    let result = engine.execute(&ancestor_walk("e3")).unwrap();
    assert_eq!(result.rows.len(), 3);

    let walk: Vec<(String, i64)> = result
        .rows
        .iter()
        .map(|row| {
            (
                row["node"].as_str().unwrap().to_string(),
                row["level"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        walk,
        vec![
            ("e3".to_string(), 0),
            ("e2".to_string(), 1),
            ("e1".to_string(), 2),
        ]
    );

    // Strictly increasing levels, each ancestor exactly once
    let mut nodes: Vec<&(String, i64)> = walk.iter().collect();
    nodes.sort_by(|a, b| a.0.cmp(&b.0));
    nodes.dedup_by(|a, b| a.0 == b.0);
    assert_eq!(nodes.len(), 3);
    assert!(walk.windows(2).all(|pair| pair[0].1 < pair[1].1));
}

#[test]
fn test_cyclic_parent_pointers_terminate() {
    // e1 <-> e2 form a cycle; dedup by canonical row key must converge
    let engine = employees_engine(&[("e1", json!("e2")), ("e2", json!("e1"))]);

    let statement = Statement::With(WithStatement {
        ctes: vec![CommonTable {
            name: "reachable".into(),
            recursive: true,
            statement: Statement::Compound(CompoundStatement {
                op: SetOp::Union,
                all: false,
                left: Box::new(Statement::Select(select(
                    DataSource::table("employees"),
                    vec![],
                    vec![
                        Projection::named(Expr::col("id"), "node"),
                        Projection::named(Expr::col("parent"), "next"),
                    ],
                    Some(Predicate::eq(Expr::col("id"), Expr::literal(json!("e1")))),
                    vec![],
                ))),
                right: Box::new(Statement::Select(select(
                    DataSource::table_as("reachable", "r"),
                    vec![Join {
                        kind: JoinKind::Inner,
                        source: DataSource::table_as("employees", "e"),
                        on: Predicate::eq(Expr::column("e", "id"), Expr::column("r", "next")),
                    }],
                    vec![
                        Projection::named(Expr::column("e", "id"), "node"),
                        Projection::named(Expr::column("e", "parent"), "next"),
                    ],
                    None,
                    vec![],
                ))),
            }),
        }],
        body: Box::new(Statement::Select(select(
            DataSource::table("reachable"),
            vec![],
            vec![Projection::expr(Expr::col("node"))],
            None,
            vec![SortKey::asc(Expr::col("node"))],
        ))),
    });

    let result = engine.execute(&statement).unwrap();
    let nodes: Vec<&str> = result
        .rows
        .iter()
        .map(|row| row["node"].as_str().unwrap())
        .collect();
    assert_eq!(nodes, vec!["e1", "e2"]);
}

#[test]
fn test_iteration_ceiling_is_bounded() {
    assert_eq!(MAX_RECURSIVE_ROUNDS, 1000);
}

#[test]
fn test_chained_non_recursive_ctes() {
    let engine = employees_engine(&[
        ("e1", json!(null)),
        ("e2", json!("e1")),
        ("e3", json!("e2")),
    ]);

    // WITH roots AS (parent IS NULL), named AS (SELECT node FROM roots)
    let statement = Statement::With(WithStatement {
        ctes: vec![
            CommonTable {
                name: "roots".into(),
                recursive: false,
                statement: Statement::Select(select(
                    DataSource::table("employees"),
                    vec![],
                    vec![Projection::named(Expr::col("id"), "node")],
                    Some(Predicate::IsNull {
                        expr: Expr::col("parent"),
                        negated: false,
                    }),
                    vec![],
                )),
            },
            CommonTable {
                name: "named".into(),
                recursive: false,
                statement: Statement::Select(select(
                    // Case-insensitive CTE reference
                    DataSource::table("ROOTS"),
                    vec![],
                    vec![Projection::expr(Expr::col("node"))],
                    None,
                    vec![],
                )),
            },
        ],
        body: Box::new(Statement::Select(select(
            DataSource::table("named"),
            vec![],
            vec![Projection::expr(Expr::col("node"))],
            None,
            vec![],
        ))),
    });

    let result = engine.execute(&statement).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["node"], json!("e1"));
}
