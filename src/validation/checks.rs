//! Per-value assignment checks
//!
//! Every value written by INSERT, UPDATE, or ON CONFLICT DO UPDATE is
//! checked against its field's declared kind. Null passes here; whether a
//! field may be absent is the caller's requiredness check. Reference
//! existence is the integrity pass's job, after the whole statement has
//! been walked.

use serde_json::Value;

use crate::eval::{parse_date, type_name};
use crate::schema::{FieldDefinition, FieldKind};

use super::errors::ValidationError;

/// Checks one value against one field definition. Returns the error to
/// collect, if any.
pub fn check_assignment(
    field: &FieldDefinition,
    value: &Value,
    path: &str,
) -> Option<ValidationError> {
    if value.is_null() {
        return None;
    }
    match &field.kind {
        FieldKind::String => (!value.is_string())
            .then(|| ValidationError::type_mismatch(path, "string", type_name(value))),
        FieldKind::Number => (!value.is_number())
            .then(|| ValidationError::type_mismatch(path, "number", type_name(value))),
        FieldKind::Boolean => (!value.is_boolean())
            .then(|| ValidationError::type_mismatch(path, "boolean", type_name(value))),
        FieldKind::Date => {
            if parse_date(value).is_none() {
                Some(ValidationError::type_mismatch(
                    path,
                    "date",
                    match value {
                        Value::String(s) => format!("unparseable date '{}'", s),
                        other => type_name(other).to_string(),
                    },
                ))
            } else {
                None
            }
        }
        FieldKind::Enum { options } => match value.as_str() {
            Some(s) if options.iter().any(|option| option == s) => None,
            _ => Some(ValidationError::enum_violation(path, value, options)),
        },
        FieldKind::Relation { .. } => (!value.is_string()).then(|| {
            ValidationError::type_mismatch(path, "record id (string)", type_name(value))
        }),
    }
}
