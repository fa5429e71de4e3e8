//! Append-only journal of task snapshots (`tasks.wal`).
//!
//! The journal is the durability layer for task state: every task-state
//! transition appends one line-delimited JSON record of shape
//! `{"type":"upsert_task","task":{...}}`. On startup the file is replayed
//! with last-write-wins semantics to rebuild the in-memory registry.
//!
//! Appends are serialized and flushed to the OS before returning, which
//! gives crash-consistency at process granularity; fsync is intentionally
//! not issued. Unparseable lines and unknown record types are skipped on
//! read, so a torn final write cannot poison recovery.

pub mod error;
pub mod store;

pub use error::{JournalError, Result};
pub use store::Journal;
