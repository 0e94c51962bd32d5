//! Transactional table cache
//!
//! Loads each referenced collection once per query execution, snapshots it
//! into a `TableState`, and hands the same state back on every further
//! reference (self-joins, multiple CTEs, nested subqueries included).
//! Staged changes mutate only the in-memory view; the storage collaborator
//! is not touched again until commit.

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::{DocumentStore, StorageResult};

use super::state::TableState;

/// One-load-per-type cache of table states for a single query execution.
pub struct TableCache {
    store: Arc<dyn DocumentStore>,
    states: HashMap<String, TableState>,
    load_count: usize,
}

impl TableCache {
    /// Creates an empty cache over the given store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            states: HashMap::new(),
            load_count: 0,
        }
    }

    /// Returns the state for a type, loading the collection on first
    /// reference only.
    pub fn state(&mut self, type_name: &str) -> StorageResult<&mut TableState> {
        let key = type_name.to_lowercase();
        if !self.states.contains_key(&key) {
            let records = self.store.load(&key)?;
            self.load_count += 1;
            self.states
                .insert(key.clone(), TableState::new(key.clone(), records));
        }
        Ok(self.states.get_mut(&key).expect("state just inserted"))
    }

    /// The state for a type, only if already loaded this execution.
    pub fn loaded_state(&self, type_name: &str) -> Option<&TableState> {
        self.states.get(&type_name.to_lowercase())
    }

    /// All states loaded so far, in deterministic (sorted) order.
    pub fn loaded(&self) -> Vec<&TableState> {
        let mut states: Vec<&TableState> = self.states.values().collect();
        states.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        states
    }

    /// All states with staged changes, in deterministic (sorted) order.
    pub fn dirty(&self) -> Vec<&TableState> {
        self.loaded()
            .into_iter()
            .filter(|state| state.is_dirty())
            .collect()
    }

    /// Number of collaborator loads performed so far.
    pub fn load_count(&self) -> usize {
        self.load_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::table::Record;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn store_with_users() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), json!("Alice"));
        store.seed("users", vec![Record::new("u1", fields)]);
        Arc::new(store)
    }

    #[test]
    fn test_single_load_per_type() {
        let mut cache = TableCache::new(store_with_users());

        cache.state("users").unwrap();
        cache.state("USERS").unwrap();
        cache.state("Users").unwrap();

        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn test_snapshot_isolated_from_store() {
        let store = store_with_users();
        let mut cache = TableCache::new(store.clone());
        cache.state("users").unwrap();

        // External write after the snapshot is invisible to this execution
        store.seed("users", vec![]);

        assert_eq!(cache.state("users").unwrap().current.len(), 1);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut cache = TableCache::new(store_with_users());
        cache.state("users").unwrap();
        assert!(cache.dirty().is_empty());

        cache.state("users").unwrap().stage_delete("u1");
        let dirty = cache.dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].type_name, "users");
    }

    #[test]
    fn test_loaded_order_deterministic() {
        let store = store_with_users();
        store.seed("orders", vec![]);
        store.seed("archives", vec![]);
        let mut cache = TableCache::new(store);

        cache.state("users").unwrap();
        cache.state("orders").unwrap();
        cache.state("archives").unwrap();

        let names: Vec<&str> = cache.loaded().iter().map(|s| s.type_name.as_str()).collect();
        assert_eq!(names, vec!["archives", "orders", "users"]);
    }
}
