//! The database manager: one handle, any backend.

use crate::iterator::DbIterator;
use crate::search::{self, SearchMode};
use crate::shard::{infer_shard_count, ShardRouter};
use polydbm_core::{DbmType, Engine, Error, GenericParams, OpenParams, Result};
use polydbm_storage::open_engine;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Handle to a database of any supported type.
///
/// The backend is chosen at [`open`](Self::open) from the `dbm` parameter or
/// the file extension. Every other operation takes `&self` and may be called
/// from many threads at once.
///
/// # Examples
///
/// ```rust,no_run
/// use polydbm::{DbManager, OpenParams};
///
/// # fn main() -> polydbm::Result<()> {
/// let mut db = DbManager::new();
/// db.open("casket.tkh", true, &OpenParams::new().with("num_buckets", "1000"))?;
/// db.set(b"apple", b"red", true)?;
/// assert_eq!(db.get(b"apple")?, b"red");
/// db.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct DbManager {
    engine: Option<Box<dyn Engine>>,
}

impl DbManager {
    /// Creates an unopened manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the database at `path`.
    ///
    /// Generic parameters (`truncate`, `no_create`, `no_wait`, `no_lock`,
    /// `num_shards`, `dbm`) are applied to every shard; the rest must be
    /// tuning keys of the selected backend.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, writable: bool, params: &OpenParams) -> Result<()> {
        if self.engine.is_some() {
            return Err(Error::Precondition("opened database".to_string()));
        }
        let path = path.as_ref();
        let generic = GenericParams::split(params, writable)?;
        let dbm_type = match generic.dbm {
            Some(dbm_type) => dbm_type,
            None => DbmType::from_path(path).ok_or_else(|| {
                Error::InvalidArgument(format!("unknown database type for {}", path.display()))
            })?,
        };

        let num_shards = match generic.num_shards {
            Some(0) => Some(infer_shard_count(path)?.unwrap_or(1)),
            Some(n) => Some(n),
            None if !path.as_os_str().is_empty() && !path.exists() => infer_shard_count(path)?,
            None => None,
        };

        let engine: Box<dyn Engine> = match num_shards {
            Some(n) => Box::new(ShardRouter::open(dbm_type, path, &generic.flags, &generic.tuning, n)?),
            None => open_engine(dbm_type, path, &generic.flags, &generic.tuning)?,
        };
        info!(
            class = %dbm_type,
            path = %path.display(),
            writable,
            num_shards = num_shards.unwrap_or(0),
            "Opened database"
        );
        self.engine = Some(engine);
        Ok(())
    }

    /// Closes the database. The manager may be opened again afterwards.
    pub fn close(&mut self) -> Result<()> {
        let mut engine = self.engine.take().ok_or_else(Error::not_opened)?;
        let result = engine.close();
        info!(class = %engine.dbm_type(), "Closed database");
        result
    }

    /// Whether a database is open.
    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    fn engine(&self) -> Result<&dyn Engine> {
        self.engine.as_deref().ok_or_else(Error::not_opened)
    }

    /// Returns the value of `key`, or `NotFound`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.engine()?.get(key)
    }

    /// Stores a record; without `overwrite` an existing key fails with
    /// `Duplication`.
    pub fn set(&self, key: &[u8], value: &[u8], overwrite: bool) -> Result<()> {
        self.engine()?.set(key, value, overwrite)
    }

    /// Removes `key`, or fails with `NotFound`.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.engine()?.remove(key)
    }

    /// Appends `value` to the current value with `delim` in between.
    pub fn append(&self, key: &[u8], value: &[u8], delim: &[u8]) -> Result<()> {
        self.engine()?.append(key, value, delim)
    }

    /// Replaces the value only if the record is in the `expected` state.
    /// `None` means absent on either side.
    pub fn compare_exchange(&self, key: &[u8], expected: Option<&[u8]>, desired: Option<&[u8]>) -> Result<()> {
        self.engine()?.compare_exchange(key, expected, desired)
    }

    /// Adds to an 8-byte big-endian counter and returns the new value.
    pub fn increment(&self, key: &[u8], increment: i64, initial: i64) -> Result<i64> {
        self.engine()?.increment(key, increment, initial)
    }

    /// Runs a custom record processor under the key's lock.
    pub fn process(&self, key: &[u8], proc: &mut polydbm_core::Processor<'_>, writable: bool) -> Result<()> {
        self.engine()?.process(key, proc, writable)
    }

    /// Number of records, summed over shards.
    pub fn count(&self) -> Result<u64> {
        self.engine()?.count()
    }

    /// Total size of the database files. In-memory types report `Unsupported`.
    pub fn file_size(&self) -> Result<u64> {
        self.engine()?.file_size()
    }

    /// Path given at open.
    pub fn file_path(&self) -> Result<PathBuf> {
        self.engine()?.file_path()
    }

    /// Removes every record.
    pub fn clear(&self) -> Result<()> {
        self.engine()?.clear()
    }

    /// Reorganizes the database, optionally with new tuning. Records are kept
    /// and tuning keys not given keep their current value.
    pub fn rebuild(&self, params: &OpenParams) -> Result<()> {
        let engine = self.engine()?;
        engine.rebuild(params)?;
        info!(class = %engine.dbm_type(), "Rebuilt database");
        Ok(())
    }

    /// Whether a rebuild would reclaim space or restore health.
    pub fn should_be_rebuilt(&self) -> Result<bool> {
        self.engine()?.should_be_rebuilt()
    }

    /// Writes pending changes to the files; `hard` also syncs them to the
    /// device. Skip databases accept `merge` and `reducer` here.
    pub fn synchronize(&self, hard: bool, params: &OpenParams) -> Result<()> {
        self.engine()?.synchronize(hard, params)
    }

    /// `false` when unopened.
    pub fn is_healthy(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_healthy())
    }

    /// `false` when unopened.
    pub fn is_ordered(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_ordered())
    }

    /// `false` when unopened.
    pub fn is_writable(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_writable())
    }

    /// Backend type chosen at open.
    pub fn dbm_type(&self) -> Result<DbmType> {
        Ok(self.engine()?.dbm_type())
    }

    /// Writes a copy of the database to `dest`. Sharded databases write one
    /// file per shard, named after `dest`.
    pub fn copy_file<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        self.engine()?.copy_file(dest.as_ref())
    }

    /// Copies every record into another open database.
    pub fn export(&self, dest: &DbManager) -> Result<()> {
        let dest = dest.engine()?;
        self.engine()?.export_to(dest)
    }

    /// Writes every key to `dest`, one per line.
    pub fn export_keys_as_lines<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let engine = self.engine()?;
        let mut out = BufWriter::new(File::create(dest.as_ref())?);
        let mut iter = engine.make_iterator();
        iter.first()?;
        while let Some((key, _)) = iter.step()? {
            out.write_all(&key)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Properties of the database, at least `class`, `path`, `num_records`,
    /// `file_size` and `healthy`.
    pub fn inspect(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.engine()?.inspect().into_iter().collect())
    }

    /// Creates an unpositioned iterator.
    pub fn make_iterator(&self) -> Result<DbIterator<'_>> {
        Ok(DbIterator::new(self.engine()?.make_iterator()))
    }

    /// Returns up to `capacity` keys matching `pattern`, 0 meaning no limit.
    ///
    /// `mode` is one of `contain`, `begin`, `end`, `regex` or `edit`. With
    /// `utf` regular expressions and edit distances work on characters
    /// instead of bytes.
    pub fn search(&self, mode: &str, pattern: &[u8], capacity: usize, utf: bool) -> Result<Vec<Vec<u8>>> {
        let mode: SearchMode = mode.parse()?;
        search::search(self.engine()?, mode, pattern, capacity, utf)
    }

    /// Like [`search`](Self::search), keeping keys found before a failure in `out`.
    pub fn search_into(
        &self,
        mode: &str,
        pattern: &[u8],
        capacity: usize,
        utf: bool,
        out: &mut Vec<Vec<u8>>,
    ) -> Result<()> {
        let mode: SearchMode = mode.parse()?;
        search::search_into(self.engine()?, mode, pattern, capacity, utf, out)
    }

    /// [`get`](Self::get) with text; invalid UTF-8 is replaced.
    pub fn get_str(&self, key: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.get(key.as_bytes())?).into_owned())
    }

    /// [`set`](Self::set) with text.
    pub fn set_str(&self, key: &str, value: &str, overwrite: bool) -> Result<()> {
        self.set(key.as_bytes(), value.as_bytes(), overwrite)
    }

    /// [`remove`](Self::remove) with text.
    pub fn remove_str(&self, key: &str) -> Result<()> {
        self.remove(key.as_bytes())
    }

    /// [`append`](Self::append) with text.
    pub fn append_str(&self, key: &str, value: &str, delim: &str) -> Result<()> {
        self.append(key.as_bytes(), value.as_bytes(), delim.as_bytes())
    }

    /// [`compare_exchange`](Self::compare_exchange) with text.
    pub fn compare_exchange_str(&self, key: &str, expected: Option<&str>, desired: Option<&str>) -> Result<()> {
        self.compare_exchange(key.as_bytes(), expected.map(str::as_bytes), desired.map(str::as_bytes))
    }

    /// [`increment`](Self::increment) on a text key.
    pub fn increment_str(&self, key: &str, increment: i64, initial: i64) -> Result<i64> {
        self.increment(key.as_bytes(), increment, initial)
    }

    /// Character-aware [`search`](Self::search) over text keys.
    pub fn search_str(&self, mode: &str, pattern: &str, capacity: usize) -> Result<Vec<String>> {
        Ok(self
            .search(mode, pattern.as_bytes(), capacity, true)?
            .into_iter()
            .map(|key| String::from_utf8_lossy(&key).into_owned())
            .collect())
    }
}

impl fmt::Display for DbManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.engine {
            None => write!(f, "DbManager(unopened)"),
            Some(engine) => {
                let path = engine.file_path().unwrap_or_default();
                let num_records = engine
                    .count()
                    .map_or_else(|_| "-1".to_string(), |n| n.to_string());
                write!(
                    f,
                    "DbManager(path={}, class={}, num_records={})",
                    path.display(),
                    engine.dbm_type(),
                    num_records
                )
            }
        }
    }
}

impl fmt::Debug for DbManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Drop for DbManager {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.close() {
                warn!(class = %engine.dbm_type(), error = %e, "Failed to close database on drop");
            }
        }
    }
}
