//! Per-query schema catalog
//!
//! Built once at the start of each query execution from the schema provider's
//! current type definitions. All lookups are case-insensitive; names are
//! normalized to lowercase on the way in.
//!
//! The three system columns (`id`, `created`, `updated`) resolve on every
//! type without consulting user-declared fields.

use std::collections::HashMap;

use super::types::{FieldDefinition, FieldKind, OnDeletePolicy, TypeDefinition};

/// System columns present on every record.
pub const SYSTEM_COLUMNS: [&str; 3] = ["id", "created", "updated"];

/// Case-insensitive lookup over the current type definitions.
///
/// Constructed fresh per query execution and threaded through the executor
/// and evaluator, never held as ambient state.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    types: HashMap<String, TypeDefinition>,
}

impl SchemaCatalog {
    /// Builds a catalog from the provider's current definitions.
    pub fn new(definitions: Vec<TypeDefinition>) -> Self {
        let mut types = HashMap::with_capacity(definitions.len());
        for def in definitions {
            types.insert(def.name.to_lowercase(), def);
        }
        Self { types }
    }

    /// Returns true if the column is a system column.
    pub fn is_system_column(column: &str) -> bool {
        SYSTEM_COLUMNS
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Looks up a type definition by case-insensitive name.
    pub fn type_definition(&self, type_name: &str) -> Option<&TypeDefinition> {
        self.types.get(&type_name.to_lowercase())
    }

    /// Returns true if the type is declared.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(&type_name.to_lowercase())
    }

    /// Looks up a field definition on a type.
    pub fn field(&self, type_name: &str, column: &str) -> Option<&FieldDefinition> {
        self.type_definition(type_name)
            .and_then(|def| def.field(column))
    }

    /// Declared kind of a column, if the type and field are known.
    ///
    /// System columns report as `string` for `id` and `date` for the
    /// timestamps.
    pub fn field_kind(&self, type_name: &str, column: &str) -> Option<FieldKind> {
        if column.eq_ignore_ascii_case("id") {
            return Some(FieldKind::String);
        }
        if column.eq_ignore_ascii_case("created") || column.eq_ignore_ascii_case("updated") {
            return Some(FieldKind::Date);
        }
        self.field(type_name, column).map(|f| f.kind.clone())
    }

    /// Effective requiredness of a declared field. System columns are always
    /// engine-assigned, never required of the caller.
    pub fn is_required(&self, type_name: &str, column: &str) -> bool {
        if Self::is_system_column(column) {
            return false;
        }
        self.field(type_name, column)
            .map(|f| f.is_required())
            .unwrap_or(false)
    }

    /// Enum options for a column, when it is an enum field.
    pub fn enum_options(&self, type_name: &str, column: &str) -> Option<&[String]> {
        match self.field(type_name, column).map(|f| &f.kind) {
            Some(FieldKind::Enum { options }) => Some(options),
            _ => None,
        }
    }

    /// Relationship target and on-delete policy, when the column is a
    /// relationship field.
    pub fn relation(&self, type_name: &str, column: &str) -> Option<(&str, OnDeletePolicy)> {
        match self.field(type_name, column).map(|f| &f.kind) {
            Some(FieldKind::Relation { target, on_delete }) => {
                Some((target.as_str(), *on_delete))
            }
            _ => None,
        }
    }

    /// All declared type names (lowercase), in unspecified order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldDefinition;

    fn sample_catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            TypeDefinition::new(
                "Users",
                vec![
                    FieldDefinition::string("name"),
                    FieldDefinition::number("age").optional(),
                    FieldDefinition::enumeration(
                        "role",
                        vec!["admin".into(), "member".into()],
                    ),
                ],
            ),
            TypeDefinition::new(
                "orders",
                vec![
                    FieldDefinition::relation("customer", "users", OnDeletePolicy::Cascade),
                    FieldDefinition::number("amount"),
                ],
            ),
        ])
    }

    #[test]
    fn test_type_lookup_case_insensitive() {
        let catalog = sample_catalog();
        assert!(catalog.has_type("users"));
        assert!(catalog.has_type("USERS"));
        assert!(catalog.has_type("Orders"));
        assert!(!catalog.has_type("invoices"));
    }

    #[test]
    fn test_field_kind_lookup() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.field_kind("users", "name"),
            Some(FieldKind::String)
        );
        assert_eq!(
            catalog.field_kind("users", "AGE"),
            Some(FieldKind::Number)
        );
        assert_eq!(catalog.field_kind("users", "missing"), None);
    }

    #[test]
    fn test_system_columns_resolve_everywhere() {
        let catalog = sample_catalog();
        assert_eq!(catalog.field_kind("users", "id"), Some(FieldKind::String));
        assert_eq!(
            catalog.field_kind("orders", "created"),
            Some(FieldKind::Date)
        );
        assert_eq!(
            catalog.field_kind("orders", "UPDATED"),
            Some(FieldKind::Date)
        );
        assert!(!catalog.is_required("users", "id"));
    }

    #[test]
    fn test_required_check() {
        let catalog = sample_catalog();
        assert!(catalog.is_required("users", "name"));
        assert!(!catalog.is_required("users", "age"));
    }

    #[test]
    fn test_enum_options() {
        let catalog = sample_catalog();
        let options = catalog.enum_options("users", "role").unwrap();
        assert_eq!(options, &["admin".to_string(), "member".to_string()]);
        assert!(catalog.enum_options("users", "name").is_none());
    }

    #[test]
    fn test_relation_lookup() {
        let catalog = sample_catalog();
        let (target, policy) = catalog.relation("orders", "customer").unwrap();
        assert_eq!(target, "users");
        assert_eq!(policy, OnDeletePolicy::Cascade);
        assert!(catalog.relation("orders", "amount").is_none());
    }
}
