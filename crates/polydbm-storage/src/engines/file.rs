//! Persistent hash and tree engines.
//!
//! The live records are held in a [`RecordTable`]; the file is a record log
//! replayed at open. Every change is appended to the log while the record's
//! lock is still held, so the log order of each key matches the order its
//! changes were applied in. Rebuilding rewrites the log with one frame per
//! live record.

use super::{
    base_properties, load_record_log, path_required, read_log_meta, reject_sync_params,
    write_record_log, WrittenLog,
};
use crate::cursor::CursorIterator;
use crate::file_lock::{temp_path, LockedFile};
use crate::table::RecordTable;
use parking_lot::{Mutex, RwLock};
use polydbm_core::{
    DbmType, Engine, EngineIterator, Error, OpenFlags, OpenParams, Processor, RecordAction,
    Result, Tuning,
};
use polydbm_log::{LogMeta, LogRecord, LogWriter, SyncMode};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use tracing::{debug, info, warn};

/// Dead frames tolerated before a rebuild is advised.
const MIN_GARBAGE_FRAMES: u64 = 16;

/// Engine persisting a record table through a record log.
pub struct FileEngine<T: RecordTable> {
    dbm_type: DbmType,
    path: PathBuf,
    writable: bool,
    /// Held shared by record operations, exclusively by maintenance
    gate: RwLock<()>,
    table: T,
    tuning: Mutex<Tuning>,
    log: Mutex<Option<LogWriter>>,
    lock: Mutex<Option<LockedFile>>,
    healthy: AtomicBool,
    /// Put and Remove frames in the log
    frames: AtomicU64,
}

impl<T: RecordTable> FileEngine<T> {
    /// Opens the database file at `path`.
    ///
    /// A new or truncated file takes the given tuning; an existing file keeps
    /// the tuning stored in its header.
    pub fn open(dbm_type: DbmType, path: &Path, flags: &OpenFlags, params: &OpenParams) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(path_required(dbm_type));
        }
        let requested = Tuning::parse(dbm_type, params)?;
        let lock = LockedFile::open(path, flags)?;
        let fresh = lock.is_empty()? || (flags.truncate && flags.writable);

        let (tuning, table, log, frames, healthy) = if fresh {
            let tuning = requested.resolved();
            let table = T::from_tuning(&tuning)?;
            let log = if flags.writable {
                let mut writer = LogWriter::create(path, SyncMode::Async)?;
                writer.append(&LogRecord::meta(LogMeta::new(
                    dbm_type.name(),
                    &tuning.to_params(),
                )))?;
                Some(writer)
            } else {
                None
            };
            (tuning, table, log, 0, true)
        } else {
            let meta = read_log_meta(path)?;
            if meta.dbm != dbm_type.name() {
                return Err(Error::InvalidArgument(format!(
                    "{} holds a {} database, not {}",
                    path.display(),
                    meta.dbm,
                    dbm_type
                )));
            }
            let tuning = Tuning::parse(dbm_type, &meta.open_params())?.resolved();
            let table = T::from_tuning(&tuning)?;
            let replayed = load_record_log(path, &table)?;
            let healthy = match &replayed.damage {
                Some(damage) => {
                    warn!(path = %path.display(), error = %damage, "Database file damaged");
                    false
                }
                None => true,
            };
            let log = if flags.writable {
                Some(LogWriter::resume(path, replayed.valid_len, SyncMode::Async)?)
            } else {
                None
            };
            (tuning, table, log, replayed.frames, healthy)
        };

        info!(
            class = %dbm_type,
            path = %path.display(),
            records = table.len(),
            writable = flags.writable,
            healthy,
            "Opened database file"
        );

        Ok(Self {
            dbm_type,
            path: path.to_path_buf(),
            writable: flags.writable,
            gate: RwLock::new(()),
            table,
            tuning: Mutex::new(tuning),
            log: Mutex::new(log),
            lock: Mutex::new(Some(lock)),
            healthy: AtomicBool::new(healthy),
            frames: AtomicU64::new(frames),
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::not_writable())
        }
    }

    /// Replaces the log with a compacted one. The gate must be held exclusively.
    fn rewrite(&self) -> Result<()> {
        let tmp = temp_path(&self.path);
        let tuning = self.tuning.lock().clone();
        let mut log = self.log.lock();

        let written = write_record_log(&tmp, self.dbm_type, &tuning, &self.table, true)
            .and_then(|written| {
                if let Some(mut old) = log.take() {
                    old.flush()?;
                }
                std::fs::rename(&tmp, &self.path)?;
                Ok(written)
            });
        let WrittenLog { frames, size } = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                if log.is_none() {
                    // the old log is still in place
                    *log = Some(LogWriter::resume(&self.path, self.file_len()?, SyncMode::Async)?);
                }
                return Err(e);
            }
        };

        *log = Some(LogWriter::resume(&self.path, size, SyncMode::Async)?);
        if let Some(lock) = self.lock.lock().as_mut() {
            lock.relock()?;
        }
        self.frames.store(frames, AtomicOrdering::Relaxed);
        self.healthy.store(true, AtomicOrdering::Relaxed);
        debug!(path = %self.path.display(), frames, size, "Rewrote record log");
        Ok(())
    }

    fn file_len(&self) -> Result<u64> {
        match self.lock.lock().as_ref() {
            Some(lock) => lock.len(),
            None => Err(Error::not_opened()),
        }
    }
}

impl<T: RecordTable> Engine for FileEngine<T> {
    fn process(&self, key: &[u8], proc: &mut Processor<'_>, writable: bool) -> Result<()> {
        if writable {
            self.check_writable()?;
        }
        let _gate = self.gate.read();
        self.table.process(key, proc, writable, &mut |key, action| {
            let record = match action {
                RecordAction::Keep => return Ok(()),
                RecordAction::Set(value) => LogRecord::put(key.to_vec(), value.clone()),
                RecordAction::Remove => LogRecord::remove(key.to_vec()),
            };
            let mut log = self.log.lock();
            let writer = log.as_mut().ok_or_else(Error::not_writable)?;
            writer.append(&record)?;
            self.frames.fetch_add(1, AtomicOrdering::Relaxed);
            Ok(())
        })
    }

    fn count(&self) -> Result<u64> {
        Ok(self.table.len())
    }

    fn file_size(&self) -> Result<u64> {
        self.file_len()
    }

    fn file_path(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn clear(&self) -> Result<()> {
        self.check_writable()?;
        let _gate = self.gate.write();
        self.table.clear();
        self.rewrite()
    }

    fn rebuild(&self, params: &OpenParams) -> Result<()> {
        self.check_writable()?;
        let requested = Tuning::parse(self.dbm_type, params)?;
        let _gate = self.gate.write();
        {
            let mut tuning = self.tuning.lock();
            tuning.merge(&requested)?;
            self.table.retune(&tuning)?;
        }
        self.rewrite()?;
        info!(
            class = %self.dbm_type,
            path = %self.path.display(),
            records = self.table.len(),
            "Rebuilt database file"
        );
        Ok(())
    }

    fn should_be_rebuilt(&self) -> Result<bool> {
        if !self.is_healthy() {
            return Ok(true);
        }
        let live = self.table.len();
        let garbage = self.frames.load(AtomicOrdering::Relaxed).saturating_sub(live);
        Ok(garbage > live.max(MIN_GARBAGE_FRAMES))
    }

    fn synchronize(&self, hard: bool, params: &OpenParams) -> Result<()> {
        reject_sync_params(self.dbm_type, params)?;
        let _gate = self.gate.write();
        if let Some(writer) = self.log.lock().as_mut() {
            if hard {
                writer.sync()?;
            } else {
                writer.flush()?;
            }
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
        let _gate = self.gate.write();
        let tuning = self.tuning.lock().clone();
        write_record_log(dest, self.dbm_type, &tuning, &self.table, true)?;
        Ok(())
    }

    fn inspect(&self) -> Vec<(String, String)> {
        let mut props = base_properties(
            self.dbm_type,
            &self.path,
            self.table.len(),
            self.file_len().ok(),
            self.is_healthy(),
        );
        props.push((
            "num_frames".to_string(),
            self.frames.load(AtomicOrdering::Relaxed).to_string(),
        ));
        props.extend(
            self.tuning
                .lock()
                .to_params()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        props.extend(self.table.inspect());
        props
    }

    fn close(&mut self) -> Result<()> {
        let result = match self.log.get_mut().take() {
            Some(mut writer) => writer.sync(),
            None => Ok(()),
        };
        self.lock.get_mut().take();
        info!(class = %self.dbm_type, path = %self.path.display(), "Closed database file");
        result
    }

    fn dbm_type(&self) -> DbmType {
        self.dbm_type
    }

    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.table.compare_keys(a, b)
    }
}
