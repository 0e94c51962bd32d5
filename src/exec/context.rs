//! Execution context
//!
//! Everything one query execution owns: the schema catalog built for this
//! query, the transactional table cache, the collected validation errors,
//! CTE materializations, and the correlation stack for nested statements.
//! Constructed fresh per invocation and passed explicitly through the
//! executor and evaluator; concurrent executions never share a context.

use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::SchemaCatalog;
use crate::storage::DocumentStore;
use crate::table::{Record, TableCache};
use crate::validation::ValidationError;

use super::row::JoinRow;

/// Per-execution state threaded through the statement walk.
pub struct ExecutionContext {
    /// Catalog built once from the schema provider at query start
    pub catalog: SchemaCatalog,
    /// One-load-per-type table snapshots plus staged changes
    pub tables: TableCache,
    /// Validation errors collected across the whole pass
    pub errors: Vec<ValidationError>,
    /// Correlation stack: outer rows visible to nested statements,
    /// innermost last
    pub outer_rows: Vec<JoinRow>,
    /// Materialized CTE rows by lowercase name
    ctes: HashMap<String, Vec<Record>>,
    synthetic_counter: u64,
}

impl ExecutionContext {
    /// Creates a context for one query execution.
    pub fn new(catalog: SchemaCatalog, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            catalog,
            tables: TableCache::new(store),
            errors: Vec::new(),
            outer_rows: Vec::new(),
            ctes: HashMap::new(),
            synthetic_counter: 0,
        }
    }

    /// Records a collected validation error.
    pub fn record_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Next ordinal for synthesized ephemeral records.
    pub fn next_synthetic(&mut self) -> u64 {
        self.synthetic_counter += 1;
        self.synthetic_counter
    }

    /// Materialized rows of a CTE, if one is in scope under the name.
    pub fn cte(&self, name: &str) -> Option<&[Record]> {
        self.ctes.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    /// Binds CTE rows under a name, returning whatever the name previously
    /// held so the caller can restore it when the scope closes.
    pub fn bind_cte(&mut self, name: &str, records: Vec<Record>) -> Option<Vec<Record>> {
        self.ctes.insert(name.to_lowercase(), records)
    }

    /// Closes a CTE scope: restores the previous binding or removes the name.
    pub fn unbind_cte(&mut self, name: &str, previous: Option<Vec<Record>>) {
        let key = name.to_lowercase();
        match previous {
            Some(records) => {
                self.ctes.insert(key, records);
            }
            None => {
                self.ctes.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::BTreeMap;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(SchemaCatalog::new(vec![]), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_cte_scoping() {
        let mut ctx = ctx();
        let outer = vec![Record::new("r1", BTreeMap::new())];
        let inner = vec![Record::new("r2", BTreeMap::new())];

        let previous = ctx.bind_cte("Recent", outer);
        assert!(previous.is_none());
        assert_eq!(ctx.cte("recent").unwrap()[0].id, "r1");

        // Shadow, then restore
        let previous = ctx.bind_cte("RECENT", inner);
        assert_eq!(ctx.cte("recent").unwrap()[0].id, "r2");
        ctx.unbind_cte("recent", previous);
        assert_eq!(ctx.cte("recent").unwrap()[0].id, "r1");

        ctx.unbind_cte("recent", None);
        assert!(ctx.cte("recent").is_none());
    }

    #[test]
    fn test_synthetic_ordinals_unique() {
        let mut ctx = ctx();
        let a = ctx.next_synthetic();
        let b = ctx.next_synthetic();
        assert_ne!(a, b);
    }
}
