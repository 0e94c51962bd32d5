//! stratadb - A staged, schema-validated query engine for document collections
//!
//! Executes declarative statement trees (joins, grouping, window functions,
//! recursive CTEs, set operations) against per-type record collections,
//! stages every mutation in memory, validates schema and referential
//! integrity, and commits optimistically against an external storage
//! collaborator guarded by collection fingerprints.

pub mod ast;
pub mod commit;
pub mod eval;
pub mod exec;
pub mod observability;
pub mod schema;
pub mod storage;
pub mod table;
pub mod validation;
