//! Schema subsystem for stratadb
//!
//! Type definitions describe each record collection's fields; the
//! `SchemaCatalog` is the per-query lookup built from the schema provider's
//! current definitions.
//!
//! # Invariants
//!
//! - Type and field names match case-insensitively
//! - System columns (id, created, updated) resolve on every type
//! - The catalog is constructed fresh per query execution

mod catalog;
mod types;

pub use catalog::{SchemaCatalog, SYSTEM_COLUMNS};
pub use types::{FieldDefinition, FieldKind, OnDeletePolicy, TypeDefinition};

/// Source of the current type definitions, consulted once per query.
pub trait SchemaProvider {
    /// Returns the current list of type definitions.
    fn type_definitions(&self) -> Vec<TypeDefinition>;
}

impl<F> SchemaProvider for F
where
    F: Fn() -> Vec<TypeDefinition>,
{
    fn type_definitions(&self) -> Vec<TypeDefinition> {
        self()
    }
}
