//! In-memory reference store
//!
//! Collections live in a mutex-guarded map; `load` hands out cloned
//! snapshots so callers never observe another caller's in-flight mutation.
//! Suitable for tests and for embedders that persist elsewhere.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::table::Record;

use super::errors::{StorageError, StorageResult};
use super::store::DocumentStore;

/// Mutex-guarded in-memory implementation of [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a collection, replacing any existing records.
    pub fn seed(&self, type_name: &str, records: Vec<Record>) {
        let mut collections = self.collections.lock().expect("memory store poisoned");
        collections.insert(type_name.to_lowercase(), records);
    }

    /// Snapshot of a collection's current records.
    pub fn snapshot(&self, type_name: &str) -> Vec<Record> {
        let collections = self.collections.lock().expect("memory store poisoned");
        collections
            .get(&type_name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, type_name: &str) -> StorageResult<Vec<Record>> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| StorageError::Unavailable(type_name.to_string()))?;
        Ok(collections
            .get(&type_name.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    fn save(
        &self,
        type_name: &str,
        mutator: &mut dyn FnMut(&mut Vec<Record>),
    ) -> StorageResult<()> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| StorageError::Unavailable(type_name.to_string()))?;
        let records = collections.entry(type_name.to_lowercase()).or_default();
        mutator(records);
        Ok(())
    }
}
