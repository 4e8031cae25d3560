//! The contract every storage backend fulfils.
//!
//! Backends implement a single per-key atomic primitive, [`Engine::process`],
//! plus maintenance and introspection hooks. Every user-facing single-key
//! operation (get, set, remove, append, compare-exchange, increment) is
//! written once here on top of `process`, so all backends share identical
//! semantics and status codes.

use crate::params::{DbmType, OpenParams};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A key-value pair.
pub type Record = (Vec<u8>, Vec<u8>);

/// Passing this as the increment returns the current value without changing it.
pub const INCREMENT_NOOP: i64 = i64::MIN;

/// What a record processor wants done with the record it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordAction {
    /// Leave the record as it is (or absent)
    Keep,
    /// Store this value
    Set(Vec<u8>),
    /// Delete the record
    Remove,
}

/// Callback invoked with the current value of a key, under the key's lock.
pub type Processor<'a> = dyn FnMut(Option<&[u8]>) -> RecordAction + 'a;

/// Storage backend interface.
pub trait Engine: Send + Sync {
    /// Shows the current value of `key` (or `None`) to `proc` and applies the
    /// returned action atomically with respect to other operations on `key`.
    ///
    /// With `writable == false` the processor must answer [`RecordAction::Keep`];
    /// anything else fails with `Precondition`. With `writable == true` a
    /// read-only engine fails with `Precondition` before calling `proc`.
    fn process(&self, key: &[u8], proc: &mut Processor<'_>, writable: bool) -> Result<()>;

    /// Number of live records.
    fn count(&self) -> Result<u64>;

    /// Size of the backing file in bytes.
    fn file_size(&self) -> Result<u64>;

    /// Path the engine was opened with.
    fn file_path(&self) -> Result<PathBuf>;

    /// Removes every record.
    fn clear(&self) -> Result<()>;

    /// Reorganizes storage, keeping all records. Parameters given override the
    /// current tuning; the others keep their effective value.
    fn rebuild(&self, params: &OpenParams) -> Result<()>;

    /// Whether a rebuild would improve space or speed.
    fn should_be_rebuilt(&self) -> Result<bool>;

    /// Writes pending state to storage, with `hard` also flushing the device.
    fn synchronize(&self, hard: bool, params: &OpenParams) -> Result<()>;

    /// False once damage has been detected.
    fn is_healthy(&self) -> bool;

    /// Whether iteration follows [`Engine::compare_keys`].
    fn is_ordered(&self) -> bool;

    /// Whether writes are accepted.
    fn is_writable(&self) -> bool;

    /// Creates an unbound iterator.
    fn make_iterator(&self) -> Box<dyn EngineIterator + '_>;

    /// Writes a consistent copy of the database to `dest`.
    fn copy_file(&self, dest: &Path) -> Result<()>;

    /// Internal properties as name/value pairs.
    fn inspect(&self) -> Vec<(String, String)>;

    /// Flushes and releases resources; the engine must not be used afterwards.
    fn close(&mut self) -> Result<()>;

    /// The backend type.
    fn dbm_type(&self) -> DbmType;

    /// Key order used by the iterator.
    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    /// Returns the value of `key`, or `NotFound`.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut found = None;
        self.process(
            key,
            &mut |value| {
                found = value.map(<[u8]>::to_vec);
                RecordAction::Keep
            },
            false,
        )?;
        found.ok_or_else(|| Error::NotFound("no such record".to_string()))
    }

    /// Stores `value`; without `overwrite` an existing key fails with `Duplication`.
    fn set(&self, key: &[u8], value: &[u8], overwrite: bool) -> Result<()> {
        let mut duplicated = false;
        self.process(
            key,
            &mut |old| {
                if old.is_some() && !overwrite {
                    duplicated = true;
                    RecordAction::Keep
                } else {
                    RecordAction::Set(value.to_vec())
                }
            },
            true,
        )?;
        if duplicated {
            return Err(Error::Duplication("record exists".to_string()));
        }
        Ok(())
    }

    /// Removes `key`, or fails with `NotFound`.
    fn remove(&self, key: &[u8]) -> Result<()> {
        let mut existed = false;
        self.process(
            key,
            &mut |old| {
                existed = old.is_some();
                if existed {
                    RecordAction::Remove
                } else {
                    RecordAction::Keep
                }
            },
            true,
        )?;
        if !existed {
            return Err(Error::NotFound("no such record".to_string()));
        }
        Ok(())
    }

    /// Appends `value` to the existing value with `delim` in between, or
    /// stores `value` alone when the key is absent.
    fn append(&self, key: &[u8], value: &[u8], delim: &[u8]) -> Result<()> {
        self.process(
            key,
            &mut |old| match old {
                Some(old) => {
                    let mut joined = Vec::with_capacity(old.len() + delim.len() + value.len());
                    joined.extend_from_slice(old);
                    joined.extend_from_slice(delim);
                    joined.extend_from_slice(value);
                    RecordAction::Set(joined)
                }
                None => RecordAction::Set(value.to_vec()),
            },
            true,
        )
    }

    /// Replaces the value when the current state equals `expected`.
    ///
    /// `None` stands for an absent record on both sides: expecting `None`
    /// demands absence, desiring `None` removes the record. A present record
    /// that mismatches fails with `Duplication`; an absent one with `NotFound`.
    fn compare_exchange(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        desired: Option<&[u8]>,
    ) -> Result<()> {
        let mut outcome = Ok(());
        self.process(
            key,
            &mut |current| match (current, expected) {
                (None, None) => match desired {
                    Some(desired) => RecordAction::Set(desired.to_vec()),
                    None => RecordAction::Keep,
                },
                (Some(_), None) => {
                    outcome = Err(Error::Duplication("record exists".to_string()));
                    RecordAction::Keep
                }
                (None, Some(_)) => {
                    outcome = Err(Error::NotFound("no such record".to_string()));
                    RecordAction::Keep
                }
                (Some(current), Some(expected)) if current == expected => match desired {
                    Some(desired) => RecordAction::Set(desired.to_vec()),
                    None => RecordAction::Remove,
                },
                (Some(_), Some(_)) => {
                    outcome = Err(Error::Duplication("value mismatch".to_string()));
                    RecordAction::Keep
                }
            },
            true,
        )?;
        outcome
    }

    /// Adds `increment` to the 8-byte big-endian counter stored at `key` and
    /// returns the new value. An absent counter starts at `initial`.
    /// [`INCREMENT_NOOP`] reads the counter, creating it when absent.
    fn increment(&self, key: &[u8], increment: i64, initial: i64) -> Result<i64> {
        let mut outcome = Ok(initial);
        self.process(
            key,
            &mut |current| {
                let base = match current {
                    None => initial,
                    Some(bytes) => match <[u8; 8]>::try_from(bytes) {
                        Ok(bytes) => i64::from_be_bytes(bytes),
                        Err(_) => {
                            outcome = Err(Error::InvalidArgument(format!(
                                "counter value must be 8 bytes, found {}",
                                bytes.len()
                            )));
                            return RecordAction::Keep;
                        }
                    },
                };
                if increment == INCREMENT_NOOP {
                    outcome = Ok(base);
                    return match current {
                        Some(_) => RecordAction::Keep,
                        None => RecordAction::Set(base.to_be_bytes().to_vec()),
                    };
                }
                let total = base.wrapping_add(increment);
                outcome = Ok(total);
                RecordAction::Set(total.to_be_bytes().to_vec())
            },
            true,
        )?;
        outcome
    }

    /// Copies every live record into `dest`, overwriting existing keys.
    fn export_to(&self, dest: &dyn Engine) -> Result<()> {
        let mut iter = self.make_iterator();
        iter.first()?;
        while let Some((key, value)) = iter.step()? {
            dest.set(&key, &value, true)?;
        }
        Ok(())
    }
}

/// Cursor over the records of an engine.
///
/// Iterators are weakly consistent: every read re-fetches the live record,
/// so a record removed before it is reached is skipped.
pub trait EngineIterator {
    /// Positions at the first record.
    fn first(&mut self) -> Result<()>;

    /// Positions at the last record; ordered engines only.
    fn last(&mut self) -> Result<()>;

    /// Positions at `key`, or the record following it.
    fn jump(&mut self, key: &[u8]) -> Result<()>;

    /// Positions at the last record below `key` (or equal, when `inclusive`).
    fn jump_lower(&mut self, key: &[u8], inclusive: bool) -> Result<()>;

    /// Positions at the first record above `key` (or equal, when `inclusive`).
    fn jump_upper(&mut self, key: &[u8], inclusive: bool) -> Result<()>;

    /// Moves to the next record.
    fn next(&mut self) -> Result<()>;

    /// Moves to the previous record; ordered engines only.
    fn previous(&mut self) -> Result<()>;

    /// Returns the record at the current position.
    fn get(&mut self) -> Result<Record>;

    /// Replaces the value of the current record and moves to the next one.
    fn set(&mut self, value: &[u8]) -> Result<()>;

    /// Removes the current record and moves to the next one.
    fn remove(&mut self) -> Result<()>;

    /// Returns the key at the current position.
    fn get_key(&mut self) -> Result<Vec<u8>> {
        Ok(self.get()?.0)
    }

    /// Returns the value at the current position.
    fn get_value(&mut self) -> Result<Vec<u8>> {
        Ok(self.get()?.1)
    }

    /// Reads the current record and advances; `None` once exhausted.
    fn step(&mut self) -> Result<Option<Record>> {
        match self.get() {
            Ok(record) => {
                self.next()?;
                Ok(Some(record))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Error for ordering operations on unordered engines.
pub fn unordered_error(operation: &str) -> Error {
    Error::Unsupported(format!("{} requires an ordered database", operation))
}

/// Error for cursor moves before the iterator was positioned.
pub fn unbound_error() -> Error {
    Error::Precondition("iterator is not positioned".to_string())
}
