//! Storage subsystem for stratadb
//!
//! The engine's only external writes go through the `DocumentStore`
//! collaborator: one full `load` per referenced type per query, one `save`
//! per touched type per commit. The on-disk format belongs to the
//! collaborator, never to this core.

mod errors;
mod memory;
mod store;

pub use errors::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use store::DocumentStore;
