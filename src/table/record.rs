//! Record representation
//!
//! A record is an opaque string id, creation/update timestamps, and a
//! field-name→value map. The engine also synthesizes ephemeral records for
//! subquery results, CTE materializations, and join combinations; those carry
//! synthetic identifiers and are never persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix carried by staged-insert identifiers until commit assigns a
/// durable id.
pub const PENDING_ID_PREFIX: &str = "pending:";

/// Prefix carried by engine-synthesized ephemeral records.
pub const SYNTHETIC_ID_PREFIX: &str = "derived:";

/// One record of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque string identifier
    pub id: String,
    /// Creation timestamp, engine-assigned
    pub created: DateTime<Utc>,
    /// Last-update timestamp, refreshed on every staged update
    pub updated: DateTime<Utc>,
    /// Field values by name
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a record with both timestamps set to now.
    pub fn new(id: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created: now,
            updated: now,
            fields,
        }
    }

    /// Creates an ephemeral record the engine synthesizes for derived rows.
    pub fn synthetic(ordinal: u64, fields: BTreeMap<String, Value>) -> Self {
        Self::new(format!("{}{}", SYNTHETIC_ID_PREFIX, ordinal), fields)
    }

    /// True when the id is a staged-insert placeholder.
    pub fn is_pending(&self) -> bool {
        self.id.starts_with(PENDING_ID_PREFIX)
    }

    /// Resolves a column against this record. System columns come from the
    /// record envelope; everything else is a case-insensitive field lookup.
    pub fn value_of(&self, column: &str) -> Value {
        if column.eq_ignore_ascii_case("id") {
            return Value::String(self.id.clone());
        }
        if column.eq_ignore_ascii_case("created") {
            return Value::String(self.created.to_rfc3339());
        }
        if column.eq_ignore_ascii_case("updated") {
            return Value::String(self.updated.to_rfc3339());
        }
        self.field(column).cloned().unwrap_or(Value::Null)
    }

    /// Case-insensitive field lookup, exact match first.
    pub fn field(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(name) {
            return Some(value);
        }
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Merges staged field changes into the record and refreshes `updated`.
    pub fn apply_changes(&mut self, changes: &BTreeMap<String, Value>) {
        for (name, value) in changes {
            // Replace an existing key case-insensitively rather than adding
            // a duplicate under a different case
            let existing = self
                .fields
                .keys()
                .find(|key| key.eq_ignore_ascii_case(name))
                .cloned();
            match existing {
                Some(key) => {
                    self.fields.insert(key, value.clone());
                }
                None => {
                    self.fields.insert(name.clone(), value.clone());
                }
            }
        }
        self.updated = Utc::now();
    }

    /// Full field map including the system columns, for wildcard expansion.
    pub fn full_field_map(&self) -> BTreeMap<String, Value> {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert(
            "created".to_string(),
            Value::String(self.created.to_rfc3339()),
        );
        map.insert(
            "updated".to_string(),
            Value::String(self.updated.to_rfc3339()),
        );
        map
    }
}
