//! # polydbm record log
//!
//! Framed, CRC-checked record log used as the persistence format of the
//! hash and tree database files and of in-memory database snapshots.
//!
//! ## Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of polydbm.**
//!
//! Users should depend on the main [`polydbm`](https://crates.io/crates/polydbm) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.

use serde::{Deserialize, Serialize};

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::{replay, LogReader, Replay};
pub use record::{LogMeta, LogRecord, RecordPayload, RecordType};
pub use writer::LogWriter;

/// Sync mode for log appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Call fsync after every write (strongest durability)
    Sync,
    /// Hand every frame to the operating system, fsync on request
    Async,
    /// Buffer frames until the next explicit flush (fastest)
    None,
}
