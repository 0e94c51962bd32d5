//! Records, table states, and the per-query table cache
//!
//! # Invariants
//!
//! - One collaborator load per referenced type per query execution
//! - Staged changes never touch storage before commit
//! - The fingerprint is computed at load time and re-checked at commit

mod cache;
mod fingerprint;
mod record;
mod state;

pub use cache::TableCache;
pub use fingerprint::compute_fingerprint;
pub use record::{Record, PENDING_ID_PREFIX, SYNTHETIC_ID_PREFIX};
pub use state::TableState;
