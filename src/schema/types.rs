//! Type and field definitions for document collections
//!
//! A `TypeDefinition` describes one logical record collection: its fields,
//! their declared kinds, defaults, requiredness, enum options, and for
//! relationship fields the referenced type and its on-delete policy.
//!
//! Type names and field names are matched case-insensitively and normalized
//! to lowercase for lookup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happens to a referencing record when the record it points at is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum OnDeletePolicy {
    /// Block the delete with a validation error naming the referencer
    #[default]
    Restrict,
    /// Delete the referencing record as well
    Cascade,
    /// Null out the referencing field, keep the record
    SetNull,
}

/// Declared kind of a field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 string
    String,
    /// 64-bit floating point (integers accepted)
    Number,
    /// Boolean
    Boolean,
    /// RFC 3339 date-time, stored as a string
    Date,
    /// One of a closed set of string options
    Enum {
        /// Permitted values
        options: Vec<String>,
    },
    /// Reference to a record of another type, stored as that record's id
    Relation {
        /// Referenced type name
        target: String,
        /// Policy applied when the referenced record is deleted
        #[serde(default)]
        on_delete: OnDeletePolicy,
    },
}

impl FieldKind {
    /// Returns the kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Relation { .. } => "relation",
        }
    }
}

/// A single field of a type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name (matched case-insensitively)
    pub name: String,
    /// Declared kind
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Default value applied when an insert omits the field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether the field must be present; defaults to "required unless a
    /// default exists"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl FieldDefinition {
    /// Creates a field of the given kind with no default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            required: None,
        }
    }

    /// Creates a string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Creates a number field.
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    /// Creates a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Creates a date field.
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// Creates an enum field with the given options.
    pub fn enumeration(name: impl Into<String>, options: Vec<String>) -> Self {
        Self::new(name, FieldKind::Enum { options })
    }

    /// Creates a relationship field referencing another type.
    pub fn relation(
        name: impl Into<String>,
        target: impl Into<String>,
        on_delete: OnDeletePolicy,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Relation {
                target: target.into(),
                on_delete,
            },
        )
    }

    /// Marks the field as explicitly optional.
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    /// Sets a default value (which also makes the field effectively optional).
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Effective requiredness: required unless a default exists, overridable
    /// by the explicit flag.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(self.default.is_none())
    }
}

/// Schema for one logical record collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Unique type name (matched case-insensitively)
    pub name: String,
    /// Friendly display label
    pub label: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Prompt template consumed by collaborators, not this engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_template: Option<String>,
    /// Ordered field definitions
    pub fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    /// Creates a type definition with the label defaulted to the name.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            description: None,
            knowledge_template: None,
            fields,
        }
    }

    /// Looks up a field by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}
