//! Per-query table state
//!
//! One `TableState` exists per referenced type per query execution: the
//! original snapshot as loaded, a mutable current view reflecting staged
//! changes, the pending-change maps, and the fingerprint computed at load
//! time.
//!
//! # Invariants
//!
//! - An id is in at most one of {deleted, updates ∪ inserts} at a time
//! - Staging an insert over a staged delete cancels the delete
//! - Deleting a staged insert removes the insert outright

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::fingerprint::compute_fingerprint;
use super::record::{Record, PENDING_ID_PREFIX};

/// Snapshot plus staged changes for one type.
#[derive(Debug, Clone)]
pub struct TableState {
    /// Type name, lowercase
    pub type_name: String,
    /// Records exactly as loaded
    pub original: Vec<Record>,
    /// Working view: original records minus staged deletes, plus staged
    /// inserts, with staged updates applied
    pub current: Vec<Record>,
    /// Ids staged for deletion
    pub deleted: BTreeSet<String>,
    /// Staged field changes by id
    pub updates: BTreeMap<String, BTreeMap<String, Value>>,
    /// Staged inserts by temporary id
    pub inserts: BTreeMap<String, BTreeMap<String, Value>>,
    /// Fingerprint of the collection at load time
    pub fingerprint: u32,
}

impl TableState {
    /// Snapshots a freshly loaded collection.
    pub fn new(type_name: impl Into<String>, records: Vec<Record>) -> Self {
        let fingerprint = compute_fingerprint(&records);
        Self {
            type_name: type_name.into().to_lowercase(),
            current: records.clone(),
            original: records,
            deleted: BTreeSet::new(),
            updates: BTreeMap::new(),
            inserts: BTreeMap::new(),
            fingerprint,
        }
    }

    /// True when any change is staged.
    pub fn is_dirty(&self) -> bool {
        !self.deleted.is_empty() || !self.updates.is_empty() || !self.inserts.is_empty()
    }

    /// Looks up a record in the current view.
    pub fn record(&self, id: &str) -> Option<&Record> {
        self.current.iter().find(|r| r.id == id)
    }

    /// Stages an insert under the given temporary id and returns the staged
    /// record. Inserting over a previously staged delete cancels the delete.
    pub fn stage_insert(&mut self, temp_id: &str, fields: BTreeMap<String, Value>) -> &Record {
        self.deleted.remove(temp_id);
        self.inserts.insert(temp_id.to_string(), fields.clone());

        let record = Record::new(temp_id, fields);
        self.current.push(record);
        self.current.last().expect("record just pushed")
    }

    /// Stages field changes for an existing record. Changes against a staged
    /// insert fold into the insert instead of the update map. Returns false
    /// when the id is unknown or staged for deletion.
    pub fn stage_update(&mut self, id: &str, changes: BTreeMap<String, Value>) -> bool {
        if self.deleted.contains(id) {
            return false;
        }
        let Some(record) = self.current.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        record.apply_changes(&changes);

        if let Some(insert) = self.inserts.get_mut(id) {
            insert.extend(changes);
        } else {
            self.updates.entry(id.to_string()).or_default().extend(changes);
        }
        true
    }

    /// Stages a deletion. Deleting a staged insert removes the insert
    /// outright rather than recording a delete. Returns false when the id is
    /// unknown.
    pub fn stage_delete(&mut self, id: &str) -> bool {
        if self.inserts.remove(id).is_some() {
            self.current.retain(|r| r.id != id);
            return true;
        }
        if !self.original.iter().any(|r| r.id == id) {
            return false;
        }
        self.updates.remove(id);
        self.deleted.insert(id.to_string());
        self.current.retain(|r| r.id != id);
        true
    }

    /// Allocates the next staged-insert temporary id.
    pub fn next_temp_id(&self) -> String {
        format!("{}{}:{}", PENDING_ID_PREFIX, self.type_name, self.inserts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_state() -> TableState {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), json!("Alice"));
        TableState::new("Users", vec![Record::new("u1", fields)])
    }

    fn fields_of(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_type_name_normalized() {
        assert_eq!(seeded_state().type_name, "users");
    }

    #[test]
    fn test_insert_appears_in_current() {
        let mut state = seeded_state();
        let temp_id = state.next_temp_id();
        state.stage_insert(&temp_id, fields_of(&[("name", json!("Bob"))]));

        assert_eq!(state.current.len(), 2);
        assert_eq!(state.original.len(), 1);
        assert!(state.inserts.contains_key(&temp_id));
        assert!(state.is_dirty());
    }

    #[test]
    fn test_update_merges_and_tracks() {
        let mut state = seeded_state();
        assert!(state.stage_update("u1", fields_of(&[("name", json!("Alicia"))])));

        assert_eq!(state.record("u1").unwrap().field("name"), Some(&json!("Alicia")));
        assert_eq!(
            state.updates.get("u1").unwrap().get("name"),
            Some(&json!("Alicia"))
        );
    }

    #[test]
    fn test_update_of_staged_insert_folds_into_insert() {
        let mut state = seeded_state();
        let temp_id = state.next_temp_id();
        state.stage_insert(&temp_id, fields_of(&[("name", json!("Bob"))]));

        assert!(state.stage_update(&temp_id, fields_of(&[("name", json!("Robert"))])));
        assert_eq!(
            state.inserts.get(&temp_id).unwrap().get("name"),
            Some(&json!("Robert"))
        );
        assert!(state.updates.is_empty());
    }

    #[test]
    fn test_delete_removes_from_current() {
        let mut state = seeded_state();
        assert!(state.stage_delete("u1"));

        assert!(state.current.is_empty());
        assert!(state.deleted.contains("u1"));
        assert_eq!(state.original.len(), 1);
    }

    #[test]
    fn test_delete_of_staged_insert_cancels_insert() {
        let mut state = seeded_state();
        let temp_id = state.next_temp_id();
        state.stage_insert(&temp_id, fields_of(&[("name", json!("Bob"))]));

        assert!(state.stage_delete(&temp_id));
        assert!(state.inserts.is_empty());
        assert!(!state.deleted.contains(&temp_id));
        assert_eq!(state.current.len(), 1);
    }

    #[test]
    fn test_insert_over_staged_delete_cancels_delete() {
        let mut state = seeded_state();
        state.stage_delete("u1");
        state.stage_insert("u1", fields_of(&[("name", json!("Alice v2"))]));

        assert!(!state.deleted.contains("u1"));
        assert!(state.inserts.contains_key("u1"));
        assert_eq!(state.record("u1").unwrap().field("name"), Some(&json!("Alice v2")));
    }

    #[test]
    fn test_update_of_deleted_record_refused() {
        let mut state = seeded_state();
        state.stage_delete("u1");
        assert!(!state.stage_update("u1", fields_of(&[("name", json!("ghost"))])));
        assert!(state.updates.is_empty());
    }

    #[test]
    fn test_delete_clears_pending_update() {
        let mut state = seeded_state();
        state.stage_update("u1", fields_of(&[("name", json!("Alicia"))]));
        state.stage_delete("u1");

        assert!(state.updates.is_empty());
        assert!(state.deleted.contains("u1"));
    }

    #[test]
    fn test_delete_unknown_id_refused() {
        let mut state = seeded_state();
        assert!(!state.stage_delete("missing"));
        assert!(!state.is_dirty());
    }
}
