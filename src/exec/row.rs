//! Join rows
//!
//! A join row is an explicit alias→record map rather than a single stitched
//! record, so later column resolution stays unambiguous when both sides of a
//! join share field names or a self-join binds the same type twice. Outer
//! join sides that found no match are bound as null sides: the alias is
//! present but every column resolves to null.

use serde_json::Value;

use crate::table::Record;

/// One alias bound in a join row.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Source alias the record is addressable under
    pub alias: String,
    /// Declared type for catalog checks; None for derived rows (CTE or
    /// subquery results)
    pub type_name: Option<String>,
    /// The bound record; None marks the nulled side of an outer join
    pub record: Option<Record>,
}

/// A row under evaluation: one record per source alias, in join order.
/// The first binding is the primary alias bare columns resolve against.
#[derive(Debug, Clone, Default)]
pub struct JoinRow {
    bindings: Vec<Binding>,
}

impl JoinRow {
    /// Row over a single bound record.
    pub fn single(
        alias: impl Into<String>,
        type_name: Option<String>,
        record: Record,
    ) -> Self {
        Self {
            bindings: vec![Binding {
                alias: alias.into(),
                type_name,
                record: Some(record),
            }],
        }
    }

    /// Extends the row with a further bound record.
    pub fn with_binding(
        mut self,
        alias: impl Into<String>,
        type_name: Option<String>,
        record: Option<Record>,
    ) -> Self {
        self.bindings.push(Binding {
            alias: alias.into(),
            type_name,
            record,
        });
        self
    }

    /// The binding for an alias, matched case-insensitively.
    pub fn binding(&self, alias: &str) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|b| b.alias.eq_ignore_ascii_case(alias))
    }

    /// True when the alias is bound in this row.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.binding(alias).is_some()
    }

    /// The primary binding (first in join order).
    pub fn primary(&self) -> Option<&Binding> {
        self.bindings.first()
    }

    /// All bindings in join order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Resolves a column within one alias. A nulled outer-join side yields
    /// null for every column.
    pub fn value_in(&self, alias: &str, column: &str) -> Option<Value> {
        let binding = self.binding(alias)?;
        Some(match &binding.record {
            Some(record) => record.value_of(column),
            None => Value::Null,
        })
    }

    /// Resolves a bare column: bound records in join order, primary first.
    /// When no bound record carries the column but a nulled outer-join side
    /// exists, the column resolves to null; missing everywhere is None so
    /// the caller can decide between null and a structural error.
    pub fn bare_value(&self, column: &str) -> Option<Value> {
        let mut saw_nulled_side = false;
        for binding in &self.bindings {
            match &binding.record {
                Some(record) => {
                    if record.field(column).is_some()
                        || crate::schema::SchemaCatalog::is_system_column(column)
                    {
                        return Some(record.value_of(column));
                    }
                }
                None => saw_nulled_side = true,
            }
        }
        if saw_nulled_side {
            Some(Value::Null)
        } else {
            None
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, pairs: &[(&str, Value)]) -> Record {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Record::new(id, fields)
    }

    #[test]
    fn test_alias_resolution() {
        let row = JoinRow::single(
            "u",
            Some("users".into()),
            record("u1", &[("name", json!("Alice"))]),
        );

        assert_eq!(row.value_in("u", "name"), Some(json!("Alice")));
        assert_eq!(row.value_in("U", "id"), Some(json!("u1")));
        assert_eq!(row.value_in("orders", "name"), None);
    }

    #[test]
    fn test_bare_column_prefers_primary() {
        let row = JoinRow::single(
            "u",
            Some("users".into()),
            record("u1", &[("name", json!("Alice"))]),
        )
        .with_binding(
            "o",
            Some("orders".into()),
            Some(record("o1", &[("name", json!("order-name")), ("amount", json!(5))])),
        );

        assert_eq!(row.bare_value("name"), Some(json!("Alice")));
        assert_eq!(row.bare_value("amount"), Some(json!(5)));
        assert_eq!(row.bare_value("missing"), None);
    }

    #[test]
    fn test_nulled_side_resolves_null() {
        let row = JoinRow::single(
            "u",
            Some("users".into()),
            record("u1", &[("name", json!("Alice"))]),
        )
        .with_binding("o", Some("orders".into()), None);

        assert_eq!(row.value_in("o", "amount"), Some(Value::Null));
        assert_eq!(row.value_in("o", "id"), Some(Value::Null));
    }

    #[test]
    fn test_nulled_side_does_not_shadow_bound_records() {
        let row = JoinRow::single("u", Some("users".into()), record("u1", &[]))
            .with_binding(
                "o",
                Some("orders".into()),
                Some(record("o1", &[("amount", json!(5))])),
            );
        let mut unmatched = JoinRow::default();
        unmatched = unmatched.with_binding("u", Some("users".into()), None);
        unmatched = unmatched.with_binding(
            "o",
            Some("orders".into()),
            Some(record("o1", &[("amount", json!(5))])),
        );

        // A bound record later in join order still wins over a nulled side
        assert_eq!(row.bare_value("amount"), Some(json!(5)));
        assert_eq!(unmatched.bare_value("amount"), Some(json!(5)));
        // Columns belonging to the nulled side resolve to null
        assert_eq!(unmatched.bare_value("name"), Some(json!(null)));
    }
}
