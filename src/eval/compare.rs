//! Value comparison and canonical keys
//!
//! Ordering rules across type families: null < bool < number < string <
//! array < object. Within a family, natural ordering. Canonical keys feed
//! grouping, DISTINCT, set operations, and ON CONFLICT matching; numbers are
//! normalized first so `1` and `1.0` collide.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

/// Returns the value's type family name for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_order(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total, deterministic ordering over values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (a_type, b_type) = (type_order(a), type_order(b));
    if a_type != b_type {
        return a_type.cmp(&b_type);
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ordering = compare_values(xv, yv);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => canonical_key(a).cmp(&canonical_key(b)),
        _ => Ordering::Equal,
    }
}

/// Numeric view of a value, if it has one.
pub fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Wraps a float back into a value, preferring integer representation for
/// whole numbers.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < (i64::MAX as f64) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Canonical serialization of a value: type-prefixed, numbers normalized,
/// object keys sorted. Equal canonical keys mean equal for grouping,
/// DISTINCT, set operations, and conflict detection.
pub fn canonical_key(value: &Value) -> String {
    match value {
        Value::Null => "z".to_string(),
        Value::Bool(b) => format!("b:{}", b),
        Value::Number(n) => format!("n:{}", n.as_f64().unwrap_or(0.0)),
        Value::String(s) => format!("s:{}", s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_key).collect();
            format!("a:[{}]", parts.join("\u{1f}"))
        }
        Value::Object(map) => {
            // serde_json's default map is ordered, so iteration is already
            // key-sorted
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}\u{1e}{}", k, canonical_key(v)))
                .collect();
            format!("o:{{{}}}", parts.join("\u{1f}"))
        }
    }
}

/// Canonical key of a whole output row.
pub fn canonical_row_key(row: &BTreeMap<String, Value>) -> String {
    let parts: Vec<String> = row
        .iter()
        .map(|(name, value)| format!("{}\u{1e}{}", name.to_lowercase(), canonical_key(value)))
        .collect();
    parts.join("\u{1f}")
}

/// Canonical key of an evaluated key tuple.
pub fn canonical_tuple_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(canonical_key).collect();
    parts.join("\u{1f}")
}
