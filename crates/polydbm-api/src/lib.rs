//! # polydbm
//!
//! An embedded key-value database manager with eight interchangeable
//! backends behind one API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polydbm::{DbManager, OpenParams};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The extension picks the backend: .tkh is a persistent hash file
//!     let mut db = DbManager::new();
//!     db.open("casket.tkh", true, &OpenParams::new())?;
//!
//!     db.set(b"user:1:name", b"Alice", true)?;
//!     db.append(b"user:1:tags", b"admin", b",")?;
//!     let visits = db.increment(b"user:1:visits", 1, 0)?;
//!     println!("visits: {}", visits);
//!
//!     println!("name: {}", String::from_utf8_lossy(&db.get(b"user:1:name")?));
//!
//!     db.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! | Type         | Extension | Storage                         | Ordered |
//! |--------------|-----------|---------------------------------|---------|
//! | `HashDBM`    | `.tkh`    | hash table + record log file    | no      |
//! | `TreeDBM`    | `.tkt`    | ordered table + record log file | yes     |
//! | `SkipDBM`    | `.tks`    | sorted file + pending updates   | yes     |
//! | `TinyDBM`    | `.tkmt`   | striped in-memory hash          | no      |
//! | `BabyDBM`    | `.tkmb`   | in-memory ordered map           | yes     |
//! | `CacheDBM`   | `.tkmc`   | bounded in-memory LRU           | no      |
//! | `StdHashDBM` | `.tksh`   | in-memory hash map              | no      |
//! | `StdTreeDBM` | `.tkst`   | in-memory ordered map           | yes     |
//!
//! In-memory types can still be given a path: the file is loaded at open and
//! written back on synchronize and close. With an empty path the `dbm`
//! parameter selects the type.
//!
//! ```rust,no_run
//! use polydbm::{DbManager, OpenParams};
//!
//! let mut cache = DbManager::new();
//! let params = OpenParams::new()
//!     .with("dbm", "CacheDBM")
//!     .with("cap_rec_num", "10000");
//! cache.open("", true, &params)?;
//! # Ok::<(), polydbm::Error>(())
//! ```
//!
//! ## Sharding
//!
//! `num_shards` spreads the keys over several files named
//! `<stem>-00000-of-00004<ext>` and so on. Reopening with `num_shards=0`, or
//! without the parameter when only shard files exist, finds the count again.

pub mod iterator;
pub mod logging;
pub mod manager;
pub mod search;
pub mod shard;

pub use iterator::DbIterator;
pub use manager::DbManager;
pub use search::SearchMode;
pub use shard::ShardRouter;

// Re-export core types
pub use polydbm_core::{
    DbmType, Engine, EngineIterator, Error, KeyComparator, OpenParams, Record, RecordAction,
    Result, StatusCode, INCREMENT_NOOP,
};

// Storage components
pub use polydbm_storage::{open_engine, Reducer};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
