//! In-memory record tables shared by the memory and file engines.
//!
//! A table owns the live records and the locks that make
//! [`polydbm_core::Engine::process`] atomic per key. Engines layer
//! persistence on top through the change hook, which runs while the
//! record's lock is still held.

use polydbm_core::{Error, Processor, RecordAction, Result, Tuning};
use std::cmp::Ordering;

pub mod lru;
pub mod ordered;
pub mod std_hash;
pub mod striped;

pub use lru::LruTable;
pub use ordered::OrderedTable;
pub use std_hash::StdHashTable;
pub use striped::StripedTable;

/// Called with every effective change before it is applied; an error aborts
/// the change.
pub type ChangeHook<'a> = dyn FnMut(&[u8], &RecordAction) -> Result<()> + 'a;

/// Storage of live records with per-key atomic updates.
pub trait RecordTable: Send + Sync + Sized + 'static {
    /// Cursor type used by engine iterators
    type Cursor<'a>: KeyCursor
    where
        Self: 'a;

    /// Builds an empty table configured by `tuning`.
    fn from_tuning(tuning: &Tuning) -> Result<Self>;

    /// Applies new tuning to the existing table.
    fn retune(&self, tuning: &Tuning) -> Result<()>;

    /// Runs `proc` on `key` under the key's lock; see [`decide`].
    fn process(
        &self,
        key: &[u8],
        proc: &mut Processor<'_>,
        writable: bool,
        hook: &mut ChangeHook<'_>,
    ) -> Result<()>;

    /// Stores or deletes a record without locking semantics beyond the table's own.
    fn load(&self, key: Vec<u8>, value: Option<Vec<u8>>);

    /// Number of live records.
    fn len(&self) -> u64;

    /// Returns true if no record is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record.
    fn clear(&self);

    /// Visits every record; each record is read consistently.
    fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()>;

    /// Creates a cursor for iteration.
    fn cursor(&self) -> Self::Cursor<'_>;

    /// Whether the cursor follows [`RecordTable::compare_keys`].
    fn is_ordered(&self) -> bool;

    /// Key order of the cursor.
    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    /// Table-specific properties.
    fn inspect(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Positioning primitives behind [`crate::cursor::CursorIterator`].
pub trait KeyCursor {
    /// Called before every absolute positioning (first, last, jumps).
    fn rewind(&mut self) -> Result<()> {
        Ok(())
    }

    /// First key at or after `key` (strictly after unless `inclusive`);
    /// `None` means from the beginning.
    fn key_after(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>>;

    /// Last key at or before `key` (strictly before unless `inclusive`);
    /// `None` means from the end.
    fn key_before(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>>;

    /// Live value of `key`.
    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Tables without a resumable key order iterate over a key snapshot.
pub trait SnapshotSource {
    /// Every key currently stored.
    fn snapshot_keys(&self) -> Vec<Vec<u8>>;

    /// Value of `key` without side effects such as recency updates.
    fn peek(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// Cursor over a sorted snapshot of keys, re-reading values live.
pub struct SnapshotCursor<'a, T: SnapshotSource> {
    table: &'a T,
    keys: Vec<Vec<u8>>,
}

impl<'a, T: SnapshotSource> SnapshotCursor<'a, T> {
    /// Creates a cursor; the snapshot is taken on the first rewind.
    pub fn new(table: &'a T) -> Self {
        Self {
            table,
            keys: Vec::new(),
        }
    }
}

impl<T: SnapshotSource> KeyCursor for SnapshotCursor<'_, T> {
    fn rewind(&mut self) -> Result<()> {
        self.keys = self.table.snapshot_keys();
        self.keys.sort_unstable();
        Ok(())
    }

    fn key_after(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let index = match key {
            None => 0,
            Some(key) if inclusive => self.keys.partition_point(|k| k.as_slice() < key),
            Some(key) => self.keys.partition_point(|k| k.as_slice() <= key),
        };
        Ok(self.keys.get(index).cloned())
    }

    fn key_before(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let end = match key {
            None => self.keys.len(),
            Some(key) if inclusive => self.keys.partition_point(|k| k.as_slice() <= key),
            Some(key) => self.keys.partition_point(|k| k.as_slice() < key),
        };
        Ok(end.checked_sub(1).and_then(|i| self.keys.get(i)).cloned())
    }

    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.table.peek(key))
    }
}

/// Asks `proc` what to do with `current` and validates the answer.
///
/// Returns the action to apply, after the hook accepted it. Removing an
/// absent record is reported as `Keep` so nothing is logged for it.
pub fn decide(
    key: &[u8],
    current: Option<&[u8]>,
    proc: &mut Processor<'_>,
    writable: bool,
    hook: &mut ChangeHook<'_>,
) -> Result<RecordAction> {
    let action = proc(current);
    match action {
        RecordAction::Keep => return Ok(RecordAction::Keep),
        RecordAction::Remove if current.is_none() => return Ok(RecordAction::Keep),
        _ if !writable => {
            return Err(Error::Precondition(
                "record modified by a read-only processor".to_string(),
            ))
        }
        _ => {}
    }
    hook(key, &action)?;
    Ok(action)
}

/// Hook for tables without persistence.
pub fn no_hook(_key: &[u8], _action: &RecordAction) -> Result<()> {
    Ok(())
}

/// Mismatch between a table and the tuning handed to it.
pub(crate) fn tuning_mismatch(table: &str, tuning: &Tuning) -> Error {
    Error::InvalidArgument(format!(
        "{} cannot be configured with {} tuning",
        table,
        tuning.dbm_type()
    ))
}
