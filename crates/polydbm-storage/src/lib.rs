//! # polydbm storage engines
//!
//! The eight interchangeable backends behind the polydbm database manager.
//!
//! ## Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of polydbm.**
//!
//! Users should depend on the main [`polydbm`](https://crates.io/crates/polydbm) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.
//!
//! ---
//!
//! Every engine keeps its live records in one of four record tables and
//! differs in how, and whether, they reach the disk:
//!
//! - **Hash / Tree**: striped hash or ordered table, changes appended to a
//!   record log replayed at open
//! - **Skip**: sorted file plus a memtable of pending updates, merged on
//!   synchronize
//! - **Tiny / Baby / Cache / StdHash / StdTree**: memory only, optionally
//!   loaded from and saved to a snapshot file
//!
//! ## Architecture
//!
//! ```text
//! process(key) → RecordTable (per-key lock) → change hook → record log
//!                     ↑                                        ↓
//!               replay at open                       rewrite on rebuild
//! ```

use polydbm_core::{DbmType, Engine, OpenFlags, OpenParams, Result};
use std::path::Path;

pub mod cursor;
pub mod engines;
pub mod file_lock;
pub mod memtable;
pub mod merge;
pub mod sorted_file;
pub mod table;

pub use cursor::CursorIterator;
pub use engines::{FileEngine, MemoryEngine, SkipEngine};
pub use file_lock::LockedFile;
pub use merge::Reducer;
pub use table::{LruTable, OrderedTable, RecordTable, StdHashTable, StripedTable};

/// Persistent hash file
pub type HashEngine = FileEngine<StripedTable>;
/// Persistent ordered tree file
pub type TreeEngine = FileEngine<OrderedTable>;
/// In-memory striped hash map
pub type TinyEngine = MemoryEngine<StripedTable>;
/// In-memory ordered map with a configurable comparator
pub type BabyEngine = MemoryEngine<OrderedTable>;
/// Bounded in-memory LRU cache
pub type CacheEngine = MemoryEngine<LruTable>;
/// Plain in-memory hash map
pub type StdHashEngine = MemoryEngine<StdHashTable>;
/// Plain in-memory ordered map
pub type StdTreeEngine = MemoryEngine<OrderedTable>;

/// Opens one engine of `dbm_type` at `path`.
///
/// `params` holds backend tuning only; the generic keys must already have
/// been split off into `flags`.
pub fn open_engine(
    dbm_type: DbmType,
    path: &Path,
    flags: &OpenFlags,
    params: &OpenParams,
) -> Result<Box<dyn Engine>> {
    tracing::debug!(class = %dbm_type, path = %path.display(), "Opening engine");
    Ok(match dbm_type {
        DbmType::Hash => Box::new(HashEngine::open(dbm_type, path, flags, params)?),
        DbmType::Tree => Box::new(TreeEngine::open(dbm_type, path, flags, params)?),
        DbmType::Skip => Box::new(SkipEngine::open(path, flags, params)?),
        DbmType::Tiny => Box::new(TinyEngine::open(dbm_type, path, flags, params)?),
        DbmType::Baby => Box::new(BabyEngine::open(dbm_type, path, flags, params)?),
        DbmType::Cache => Box::new(CacheEngine::open(dbm_type, path, flags, params)?),
        DbmType::StdHash => Box::new(StdHashEngine::open(dbm_type, path, flags, params)?),
        DbmType::StdTree => Box::new(StdTreeEngine::open(dbm_type, path, flags, params)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydbm_core::StatusCode;
    use tempfile::tempdir;

    #[test]
    fn test_every_type_opens_and_stores() {
        let dir = tempdir().unwrap();
        let flags = OpenFlags {
            writable: true,
            ..Default::default()
        };
        for dbm_type in DbmType::ALL {
            let path = dir.path().join(format!("db.{}", dbm_type.extension()));
            let mut engine = open_engine(dbm_type, &path, &flags, &OpenParams::new()).unwrap();
            assert_eq!(engine.dbm_type(), dbm_type);
            assert_eq!(engine.is_ordered(), dbm_type.is_ordered());
            engine.set(b"key", b"value", true).unwrap();
            assert_eq!(engine.get(b"key").unwrap(), b"value");
            engine.close().unwrap();

            let read_only = OpenFlags::default();
            let mut engine = open_engine(dbm_type, &path, &read_only, &OpenParams::new()).unwrap();
            assert_eq!(engine.get(b"key").unwrap(), b"value", "{}", dbm_type);
            engine.close().unwrap();
        }
    }

    #[test]
    fn test_file_types_need_a_path() {
        let flags = OpenFlags {
            writable: true,
            ..Default::default()
        };
        for dbm_type in [DbmType::Hash, DbmType::Tree, DbmType::Skip] {
            let err = open_engine(dbm_type, Path::new(""), &flags, &OpenParams::new())
                .err()
                .unwrap();
            assert_eq!(err.code(), StatusCode::InvalidArgument);
        }
    }
}
