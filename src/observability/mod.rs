//! Observability for stratadb
//!
//! Structured, synchronous JSON logging with deterministic key order. The
//! commit coordinator emits one event per phase: `query_planned`,
//! `commit_applied`, `commit_rejected`.

mod logger;

pub use logger::{Logger, Severity};
