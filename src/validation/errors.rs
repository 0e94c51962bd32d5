//! Collected validation errors
//!
//! Data-level problems are accumulated across the whole plan pass rather
//! than thrown, so a single execution surfaces every issue at once.
//! Evaluation substitutes a safe default (null or zero) and continues;
//! commit eligibility goes false whenever any error exists.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One data-level validation problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Where the problem is, e.g. `users.name` or `orders[pending:orders:0].customer`
    pub path: String,
    /// Human-readable description
    pub message: String,
    /// Expected type or condition, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Actual type or value found, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Suggested fix, when one is obvious
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Free-form context for the caller
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ValidationError {
    /// Generic error with just a path and message.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            expected: None,
            actual: None,
            suggestion: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Assignment or operand type mismatch.
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let expected = expected.into();
        let actual = actual.into();
        let mut error = Self::new(
            path,
            format!("expected {}, got {}", expected, actual),
        );
        error.expected = Some(expected);
        error.actual = Some(actual);
        error
    }

    /// Value outside an enum field's option set.
    pub fn enum_violation(
        path: impl Into<String>,
        value: &Value,
        options: &[String],
    ) -> Self {
        let mut error = Self::new(
            path,
            format!(
                "value {} is not one of the permitted options",
                compact(value)
            ),
        );
        error.expected = Some(format!("one of [{}]", options.join(", ")));
        error.actual = Some(compact(value));
        error.suggestion = options.first().map(|o| format!("did you mean '{}'?", o));
        error
    }

    /// Required field absent with no default.
    pub fn missing_required(path: impl Into<String>) -> Self {
        let mut error = Self::new(path, "required field is missing");
        error.expected = Some("a value".into());
        error.actual = Some("missing".into());
        error
    }

    /// Operator applied to operands of disagreeing types.
    pub fn operator_mismatch(
        operator: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        let operator = operator.into();
        let left = left.into();
        let right = right.into();
        let mut error = Self::new(
            format!("operator.{}", operator),
            format!(
                "operator {} requires matching operand types, got {} and {}",
                operator, left, right
            ),
        );
        error.expected = Some("matching operand types".into());
        error.actual = Some(format!("{} vs {}", left, right));
        error
    }

    /// Aggregate demanding numeric input saw something else.
    pub fn aggregate_numeric(func: impl Into<String>, actual: impl Into<String>) -> Self {
        let func = func.into();
        let actual = actual.into();
        let mut error = Self::new(
            format!("aggregate.{}", func),
            format!("{} requires numeric operands, got {}", func, actual),
        );
        error.expected = Some("number".into());
        error.actual = Some(actual);
        error
    }

    /// Relationship value matching no record of the referenced type.
    pub fn broken_reference(
        path: impl Into<String>,
        target_type: impl Into<String>,
        value: &Value,
    ) -> Self {
        let target_type = target_type.into();
        let mut error = Self::new(
            path,
            format!(
                "reference {} matches no record of type {}",
                compact(value),
                target_type
            ),
        );
        error.expected = Some(format!("an existing {} id", target_type));
        error.actual = Some(compact(value));
        error
            .metadata
            .insert("target_type".into(), Value::String(target_type));
        error
    }

    /// Delete blocked by a restrict-policy referencer.
    pub fn restrict_violation(
        deleted_type: impl Into<String>,
        deleted_id: impl Into<String>,
        referencing_type: impl Into<String>,
        referencing_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        let deleted_type = deleted_type.into();
        let deleted_id = deleted_id.into();
        let referencing_type = referencing_type.into();
        let referencing_id = referencing_id.into();
        let field = field.into();
        let mut error = Self::new(
            format!("{}.{}", referencing_type, field),
            format!(
                "cannot delete {} '{}': referenced by {} '{}' via '{}'",
                deleted_type, deleted_id, referencing_type, referencing_id, field
            ),
        );
        error.suggestion = Some(format!(
            "delete {} '{}' first, or change the field's on-delete policy",
            referencing_type, referencing_id
        ));
        error
            .metadata
            .insert("deleted_type".into(), Value::String(deleted_type));
        error
            .metadata
            .insert("deleted_id".into(), Value::String(deleted_id));
        error
            .metadata
            .insert("referencing_type".into(), Value::String(referencing_type));
        error
            .metadata
            .insert("referencing_id".into(), Value::String(referencing_id));
        error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Short rendering of a value for messages.
fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
