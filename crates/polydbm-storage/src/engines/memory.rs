//! In-memory engines.
//!
//! Records live in a [`RecordTable`]. When opened with a path the database
//! is loaded from that file at open and saved back, as a compacted record
//! log, on synchronize and on close of a writable handle.

use super::{base_properties, load_record_log, reject_sync_params, write_record_log};
use crate::cursor::CursorIterator;
use crate::file_lock::{temp_path, LockedFile};
use crate::table::{no_hook, RecordTable};
use parking_lot::Mutex;
use polydbm_core::{
    DbmType, Engine, EngineIterator, Error, OpenFlags, OpenParams, Processor, Result, Tuning,
};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::{debug, info, warn};

/// Engine keeping every record in memory.
pub struct MemoryEngine<T: RecordTable> {
    dbm_type: DbmType,
    table: T,
    tuning: Mutex<Tuning>,
    path: PathBuf,
    lock: Mutex<Option<LockedFile>>,
    /// Serializes snapshot writes; they share one scratch file.
    gate: Mutex<()>,
    writable: bool,
    healthy: AtomicBool,
}

impl<T: RecordTable> MemoryEngine<T> {
    /// Opens an in-memory database of `dbm_type`, loading `path` when it names
    /// an existing snapshot. An empty path keeps the database purely in memory.
    pub fn open(dbm_type: DbmType, path: &Path, flags: &OpenFlags, params: &OpenParams) -> Result<Self> {
        let tuning = Tuning::parse(dbm_type, params)?;
        let table = T::from_tuning(&tuning)?;
        let engine = Self {
            dbm_type,
            table,
            tuning: Mutex::new(tuning),
            path: path.to_path_buf(),
            lock: Mutex::new(None),
            gate: Mutex::new(()),
            writable: flags.writable,
            healthy: AtomicBool::new(true),
        };

        if path.as_os_str().is_empty() {
            debug!(class = %dbm_type, "Opened in-memory database without file");
            return Ok(engine);
        }

        let lock = LockedFile::open(path, flags)?;
        if !(flags.truncate && flags.writable) && !lock.is_empty()? {
            let replayed = load_record_log(path, &engine.table)?;
            if let Some(damage) = replayed.damage {
                warn!(path = %path.display(), error = %damage, "Snapshot damaged, loaded readable prefix");
                engine.healthy.store(false, AtomicOrdering::Relaxed);
            }
        }
        *engine.lock.lock() = Some(lock);

        info!(
            class = %dbm_type,
            path = %path.display(),
            records = engine.table.len(),
            "Opened in-memory database"
        );
        Ok(engine)
    }

    fn has_file(&self) -> bool {
        !self.path.as_os_str().is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::not_writable())
        }
    }

    /// Writes the snapshot through a temporary file and locks the new file.
    fn save(&self, hard: bool) -> Result<()> {
        let _gate = self.gate.lock();
        let tmp = temp_path(&self.path);
        let tuning = self.tuning.lock().clone();
        let written = write_record_log(&tmp, self.dbm_type, &tuning, &self.table, hard)
            .and_then(|written| {
                std::fs::rename(&tmp, &self.path)?;
                Ok(written)
            });
        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        };
        if let Some(lock) = self.lock.lock().as_mut() {
            lock.relock()?;
        }
        debug!(path = %self.path.display(), records = written.frames, "Saved snapshot");
        Ok(())
    }
}

impl<T: RecordTable> Engine for MemoryEngine<T> {
    fn process(&self, key: &[u8], proc: &mut Processor<'_>, writable: bool) -> Result<()> {
        if writable {
            self.check_writable()?;
        }
        self.table.process(key, proc, writable, &mut no_hook)
    }

    fn count(&self) -> Result<u64> {
        Ok(self.table.len())
    }

    fn file_size(&self) -> Result<u64> {
        Err(Error::Unsupported(format!(
            "{} has no file size",
            self.dbm_type
        )))
    }

    fn file_path(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn clear(&self) -> Result<()> {
        self.check_writable()?;
        self.table.clear();
        Ok(())
    }

    fn rebuild(&self, params: &OpenParams) -> Result<()> {
        self.check_writable()?;
        let requested = Tuning::parse(self.dbm_type, params)?;
        let mut tuning = self.tuning.lock();
        tuning.merge(&requested)?;
        self.table.retune(&tuning)?;
        info!(class = %self.dbm_type, records = self.table.len(), "Rebuilt in-memory database");
        Ok(())
    }

    fn should_be_rebuilt(&self) -> Result<bool> {
        Ok(false)
    }

    fn synchronize(&self, hard: bool, params: &OpenParams) -> Result<()> {
        reject_sync_params(self.dbm_type, params)?;
        if self.writable && self.has_file() {
            self.save(hard)?;
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(AtomicOrdering::Relaxed)
    }

    fn is_ordered(&self) -> bool {
        self.table.is_ordered()
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn make_iterator(&self) -> Box<dyn EngineIterator + '_> {
        Box::new(CursorIterator::new(self, self.table.cursor()))
    }

    fn copy_file(&self, dest: &Path) -> Result<()> {
        let _gate = self.gate.lock();
        let tuning = self.tuning.lock().clone();
        write_record_log(dest, self.dbm_type, &tuning, &self.table, true)?;
        Ok(())
    }

    fn inspect(&self) -> Vec<(String, String)> {
        let mut props = base_properties(
            self.dbm_type,
            &self.path,
            self.table.len(),
            None,
            self.is_healthy(),
        );
        props.extend(
            self.tuning
                .lock()
                .resolved()
                .to_params()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        props.extend(self.table.inspect());
        props
    }

    fn close(&mut self) -> Result<()> {
        let result = if self.writable && self.has_file() {
            self.save(false)
        } else {
            Ok(())
        };
        self.lock.get_mut().take();
        info!(class = %self.dbm_type, path = %self.path.display(), "Closed in-memory database");
        result
    }

    fn dbm_type(&self) -> DbmType {
        self.dbm_type
    }

    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.table.compare_keys(a, b)
    }
}
