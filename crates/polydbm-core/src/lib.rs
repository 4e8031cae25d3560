//! # polydbm core
//!
//! Shared vocabulary of the polydbm workspace: the status taxonomy, the
//! [`Engine`] contract with its atomic single-key operations, the iterator
//! trait, key comparators, and open parameters with per-backend tuning.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comparator;
pub mod engine;
pub mod error;
pub mod format;
pub mod params;

pub use comparator::KeyComparator;
pub use engine::{Engine, EngineIterator, Processor, Record, RecordAction, INCREMENT_NOOP};
pub use error::{Error, Result, StatusCode};
pub use params::{DbmType, GenericParams, OpenFlags, OpenParams, Tuning};
