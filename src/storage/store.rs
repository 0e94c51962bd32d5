//! Storage collaborator boundary
//!
//! The engine never parses or writes the underlying storage format itself.
//! It reads whole collections through `load` and persists staged deltas
//! through `save`, a scoped read-modify-write that hands the mutator the
//! full durable record list to edit in place.

use crate::table::Record;

use super::errors::StorageResult;

/// Per-type record persistence, implemented outside this core.
///
/// `load` is an idempotent full read of the collection; calling it twice
/// without an intervening `save` returns the same records. `save` hands the
/// mutator the current durable list, then persists whatever the mutator
/// leaves behind as one atomic unit for that collection.
pub trait DocumentStore: Send + Sync {
    /// Reads every record of the collection. Unknown collections are empty,
    /// not errors; the schema catalog decides which type names are valid.
    fn load(&self, type_name: &str) -> StorageResult<Vec<Record>>;

    /// Scoped read-modify-write over the collection's durable record list.
    fn save(
        &self,
        type_name: &str,
        mutator: &mut dyn FnMut(&mut Vec<Record>),
    ) -> StorageResult<()>;
}
