//! Validation subsystem for stratadb
//!
//! Data-level problems are collected, not thrown: per-value kind checks run
//! during execution, the referential-integrity passes run once after the
//! statement tree has been fully walked, and the commit coordinator refuses
//! whenever any error was collected.

mod checks;
mod errors;
mod integrity;

pub use checks::check_assignment;
pub use errors::ValidationError;
pub use integrity::enforce_integrity;
