//! SELECT pipeline invariants
//!
//! Pure reads are deterministic: the same statement against unchanged
//! underlying data yields identical row sequences, and planning twice
//! without committing produces equal row content.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use stratadb::ast::{
    AggregateFunc, DataSource, Expr, Predicate, Projection, SelectStatement, SortKey, Statement,
};
use stratadb::commit::QueryEngine;
use stratadb::schema::{FieldDefinition, TypeDefinition};
use stratadb::storage::MemoryStore;
use stratadb::table::Record;

fn record(id: &str, pairs: &[(&str, serde_json::Value)]) -> Record {
    let fields: BTreeMap<String, serde_json::Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Record::new(id, fields)
}

fn users_engine() -> QueryEngine {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "users",
        vec![
            record("u1", &[("name", json!("Alice")), ("age", json!(30))]),
            record("u2", &[("name", json!("Bob")), ("age", json!(25))]),
            record("u3", &[("name", json!("Charlie")), ("age", json!(35))]),
        ],
    );
    let types = vec![TypeDefinition::new(
        "users",
        vec![
            FieldDefinition::string("name"),
            FieldDefinition::number("age"),
        ],
    )];
    QueryEngine::new(store, Arc::new(move || types.clone()))
}

fn orders_engine() -> QueryEngine {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "orders",
        vec![
            record("o1", &[("customer", json!("Alice")), ("amount", json!(100))]),
            record("o2", &[("customer", json!("Alice")), ("amount", json!(150))]),
            record("o3", &[("customer", json!("Bob")), ("amount", json!(200))]),
        ],
    );
    let types = vec![TypeDefinition::new(
        "orders",
        vec![
            FieldDefinition::string("customer"),
            FieldDefinition::number("amount"),
        ],
    )];
    QueryEngine::new(store, Arc::new(move || types.clone()))
}

fn order_by_age_desc() -> Statement {
    Statement::Select(SelectStatement {
        source: DataSource::table("users"),
        joins: vec![],
        projection: vec![
            Projection::expr(Expr::col("name")),
            Projection::expr(Expr::col("age")),
        ],
        filter: None,
        group_by: vec![],
        having: None,
        distinct: false,
        order_by: vec![SortKey::desc(Expr::col("age"))],
        limit: None,
        offset: None,
    })
}

#[test]
fn test_order_by_age_desc() {
    let engine = users_engine();
    let result = engine.execute(&order_by_age_desc()).unwrap();

    let names: Vec<&str> = result
        .rows
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Charlie", "Alice", "Bob"]);

    let ages: Vec<i64> = result
        .rows
        .iter()
        .map(|row| row["age"].as_i64().unwrap())
        .collect();
    assert_eq!(ages, vec![35, 30, 25]);
}

#[test]
fn test_select_executes_identically_twice() {
    let engine = users_engine();
    let first = engine.execute(&order_by_age_desc()).unwrap();
    let second = engine.execute(&order_by_age_desc()).unwrap();
    assert_eq!(first.rows, second.rows);
}

#[test]
fn test_plan_twice_is_idempotent() {
    let engine = users_engine();
    let first = engine.plan(&order_by_age_desc()).unwrap();
    let second = engine.plan(&order_by_age_desc()).unwrap();
    assert_eq!(first.result.rows, second.result.rows);
    assert!(first.deltas.is_empty());
    assert!(second.deltas.is_empty());
}

#[test]
fn test_group_by_customer_sums() {
    let engine = orders_engine();
    let statement = Statement::Select(SelectStatement {
        source: DataSource::table("orders"),
        joins: vec![],
        projection: vec![
            Projection::expr(Expr::col("customer")),
            Projection::named(
                Expr::aggregate(AggregateFunc::Sum, Some(Expr::col("amount"))),
                "total",
            ),
        ],
        filter: None,
        group_by: vec![Expr::col("customer")],
        having: None,
        distinct: false,
        order_by: vec![],
        limit: None,
        offset: None,
    });

    let result = engine.execute(&statement).unwrap();
    assert_eq!(result.rows.len(), 2);

    let mut totals: Vec<(String, i64)> = result
        .rows
        .iter()
        .map(|row| {
            (
                row["customer"].as_str().unwrap().to_string(),
                row["total"].as_i64().unwrap(),
            )
        })
        .collect();
    totals.sort();
    assert_eq!(
        totals,
        vec![("Alice".to_string(), 250), ("Bob".to_string(), 200)]
    );
}

#[test]
fn test_aggregate_without_group_collapses_to_one_row() {
    let engine = users_engine();
    let statement = Statement::Select(SelectStatement {
        source: DataSource::table("users"),
        joins: vec![],
        projection: vec![
            Projection::named(Expr::aggregate(AggregateFunc::Count, None), "n"),
            Projection::named(
                Expr::aggregate(AggregateFunc::Max, Some(Expr::col("age"))),
                "oldest",
            ),
        ],
        filter: None,
        group_by: vec![],
        having: None,
        distinct: false,
        order_by: vec![],
        limit: None,
        offset: None,
    });

    let result = engine.execute(&statement).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["n"], json!(3));
    assert_eq!(result.rows[0]["oldest"], json!(35));
}

#[test]
fn test_aggregate_over_empty_source_yields_default_row() {
    let engine = users_engine();
    let statement = Statement::Select(SelectStatement {
        source: DataSource::table("users"),
        joins: vec![],
        projection: vec![Projection::named(
            Expr::aggregate(AggregateFunc::Count, None),
            "n",
        )],
        filter: Some(Predicate::gt(Expr::col("age"), Expr::literal(json!(100)))),
        group_by: vec![],
        having: None,
        distinct: false,
        order_by: vec![],
        limit: None,
        offset: None,
    });

    let result = engine.execute(&statement).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["n"], json!(0));
}

#[test]
fn test_filter_distinct_limit_offset() {
    let engine = orders_engine();
    let statement = Statement::Select(SelectStatement {
        source: DataSource::table("orders"),
        joins: vec![],
        projection: vec![Projection::expr(Expr::col("customer"))],
        filter: Some(Predicate::gt(
            Expr::col("amount"),
            Expr::literal(json!(50)),
        )),
        group_by: vec![],
        having: None,
        distinct: true,
        order_by: vec![SortKey::asc(Expr::col("customer"))],
        limit: Some(1),
        offset: Some(1),
    });

    let result = engine.execute(&statement).unwrap();
    // Distinct customers Alice, Bob; offset 1, limit 1 leaves Bob
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["customer"], json!("Bob"));
}

#[test]
fn test_wildcard_merges_with_computed_columns() {
    let engine = users_engine();
    let statement = Statement::Select(SelectStatement {
        source: DataSource::table_as("users", "u"),
        joins: vec![],
        projection: vec![
            Projection::expr(Expr::wildcard("u")),
            Projection::named(
                Expr::binary(
                    stratadb::ast::BinaryOp::Add,
                    Expr::col("age"),
                    Expr::literal(json!(1)),
                ),
                "age_next",
            ),
        ],
        filter: Some(Predicate::eq(
            Expr::col("name"),
            Expr::literal(json!("Alice")),
        )),
        group_by: vec![],
        having: None,
        distinct: false,
        order_by: vec![],
        limit: None,
        offset: None,
    });

    let result = engine.execute(&statement).unwrap();
    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row["name"], json!("Alice"));
    assert_eq!(row["age"], json!(30));
    assert_eq!(row["age_next"], json!(31));
    assert_eq!(row["id"], json!("u1"));
    assert!(row.contains_key("created"));
}
