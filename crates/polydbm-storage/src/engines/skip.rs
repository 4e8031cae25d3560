//! Skip engine: a sorted file plus pending updates.
//!
//! Reads consult the pending updates first, then the sorted file. Pending
//! updates become durable when synchronize, rebuild or close merges them
//! into a new sorted file, optionally together with other skip files.

use super::{base_properties, path_required};
use crate::cursor::CursorIterator;
use crate::file_lock::{temp_path, LockedFile};
use crate::memtable::Memtable;
use crate::merge::{merge_sources, MergeSource, OverlaySource, Reducer};
use crate::sorted_file::{SortedFileReader, SortedFileWriter};
use crate::table::{decide, no_hook, KeyCursor};
use parking_lot::{Mutex, RwLock};
use polydbm_core::params::SkipTuning;
use polydbm_core::{
    DbmType, Engine, EngineIterator, Error, OpenFlags, OpenParams, Processor, RecordAction,
    Result, Tuning,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::{debug, info, warn};

/// Parameters understood by [`SkipEngine`]'s synchronize.
pub const SYNC_KEYS: &[&str] = &["merge", "reducer"];

struct SkipState {
    reader: Option<SortedFileReader>,
    pending: Memtable,
    count: u64,
}

impl SkipState {
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(value) => Ok(value.map(<[u8]>::to_vec)),
            None => match &self.reader {
                Some(reader) => reader.get(key),
                None => Ok(None),
            },
        }
    }

    fn is_removed(&self, key: &[u8]) -> bool {
        matches!(self.pending.get(key), Some(None))
    }
}

/// Engine over a sorted skip file.
pub struct SkipEngine {
    path: PathBuf,
    writable: bool,
    state: RwLock<SkipState>,
    tuning: Mutex<SkipTuning>,
    lock: Mutex<Option<LockedFile>>,
    healthy: AtomicBool,
}

impl SkipEngine {
    /// Opens the skip file at `path`.
    pub fn open(path: &Path, flags: &OpenFlags, params: &OpenParams) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(path_required(DbmType::Skip));
        }
        let requested = SkipTuning::parse(params)?.resolved();
        let lock = LockedFile::open(path, flags)?;
        let fresh = lock.is_empty()? || (flags.truncate && flags.writable);

        let (tuning, reader) = if fresh && flags.writable {
            write_empty(path, &requested)?;
            let reader = SortedFileReader::open(path, cache_size(&requested))?;
            (requested, Some(reader))
        } else if fresh {
            (requested, None)
        } else {
            let reader = SortedFileReader::open(path, cache_size(&requested))?;
            let stored = SkipTuning::parse(&reader.params())?.resolved();
            (stored, Some(reader))
        };
        let count = reader.as_ref().map_or(0, SortedFileReader::record_count);

        info!(
            path = %path.display(),
            records = count,
            writable = flags.writable,
            "Opened skip database"
        );

        Ok(Self {
            path: path.to_path_buf(),
            writable: flags.writable,
            state: RwLock::new(SkipState {
                reader,
                pending: Memtable::new(),
                count,
            }),
            tuning: Mutex::new(tuning),
            lock: Mutex::new(Some(lock)),
            healthy: AtomicBool::new(true),
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::not_writable())
        }
    }

    fn watch<V>(&self, result: Result<V>) -> Result<V> {
        if let Err(Error::Corruption(message)) = &result {
            warn!(path = %self.path.display(), error = %message, "Skip file damaged");
            self.healthy.store(false, AtomicOrdering::Relaxed);
        }
        result
    }

    /// Writes the merged view of `state` and `merge_paths` to `dest`.
    fn write_merged(
        &self,
        state: &SkipState,
        dest: &Path,
        merge_paths: &[PathBuf],
        reducer: Reducer,
        hard: bool,
        tuning: &SkipTuning,
    ) -> Result<u64> {
        let others = merge_paths
            .iter()
            .map(|path| SortedFileReader::open(path, 0))
            .collect::<Result<Vec<_>>>()?;

        let mut writer = SortedFileWriter::new(dest)?;
        let count = {
            let mut sources: Vec<Box<dyn MergeSource + '_>> = Vec::with_capacity(others.len() + 1);
            sources.push(Box::new(OverlaySource::new(
                state.reader.as_ref().map(SortedFileReader::iter),
                &state.pending,
            )?));
            for other in &others {
                sources.push(Box::new(other.iter()));
            }
            merge_sources(&mut sources, reducer, |key, value| writer.add(key, value))?
        };
        writer.finish(&tuning.to_params(), hard)?;
        Ok(count)
    }

    /// Replaces the sorted file with the merged view and drops the pending updates.
    /// The new file records `tuning`.
    fn flush(
        &self,
        state: &mut SkipState,
        merge_paths: &[PathBuf],
        reducer: Reducer,
        hard: bool,
        tuning: &SkipTuning,
    ) -> Result<()> {
        let tmp = temp_path(&self.path);
        let count = match self.write_merged(state, &tmp, merge_paths, reducer, hard, tuning) {
            Ok(count) => count,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return self.watch(Err(e));
            }
        };

        std::fs::rename(&tmp, &self.path)?;
        state.reader = Some(SortedFileReader::open(&self.path, cache_size(tuning))?);
        state.pending.clear();
        state.count = count;
        if let Some(lock) = self.lock.lock().as_mut() {
            lock.relock()?;
        }
        self.healthy.store(true, AtomicOrdering::Relaxed);
        debug!(
            path = %self.path.display(),
            records = count,
            sources = merge_paths.len(),
            "Wrote sorted file"
        );
        Ok(())
    }
}

fn cache_size(tuning: &SkipTuning) -> u64 {
    tuning.max_cached_records.unwrap_or(0)
}

fn write_empty(path: &Path, tuning: &SkipTuning) -> Result<()> {
    SortedFileWriter::new(path)?.finish(&tuning.to_params(), false)?;
    Ok(())
}

impl Engine for SkipEngine {
    fn process(&self, key: &[u8], proc: &mut Processor<'_>, writable: bool) -> Result<()> {
        if !writable {
            let state = self.state.read();
            let current = self.watch(state.lookup(key))?;
            decide(key, current.as_deref(), proc, false, &mut no_hook)?;
            return Ok(());
        }
        self.check_writable()?;
        let mut state = self.state.write();
        let current = self.watch(state.lookup(key))?;
        match decide(key, current.as_deref(), proc, true, &mut no_hook)? {
            RecordAction::Keep => {}
            RecordAction::Set(value) => {
                if current.is_none() {
                    state.count += 1;
                }
                state.pending.put(key.to_vec(), value);
            }
            RecordAction::Remove => {
                state.count -= 1;
                state.pending.delete(key.to_vec());
            }
        }
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.state.read().count)
    }

    fn file_size(&self) -> Result<u64> {
        match self.lock.lock().as_ref() {
            Some(lock) => lock.len(),
            None => Err(Error::not_opened()),
        }
    }

    fn file_path(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn clear(&self) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write();
        let tmp = temp_path(&self.path);
        write_empty(&tmp, &self.tuning.lock())?;
        std::fs::rename(&tmp, &self.path)?;
        state.reader = Some(SortedFileReader::open(&self.path, cache_size(&self.tuning.lock()))?);
        state.pending.clear();
        state.count = 0;
        if let Some(lock) = self.lock.lock().as_mut() {
            lock.relock()?;
        }
        self.healthy.store(true, AtomicOrdering::Relaxed);
        Ok(())
    }

    fn rebuild(&self, params: &OpenParams) -> Result<()> {
        self.check_writable()?;
        let requested = SkipTuning::parse(params)?;
        let mut state = self.state.write();
        let mut tuning = self.tuning.lock().clone();
        tuning.merge(&requested);
        self.flush(&mut state, &[], Reducer::default(), false, &tuning)?;
        *self.tuning.lock() = tuning;
        info!(path = %self.path.display(), records = state.count, "Rebuilt skip database");
        Ok(())
    }

    fn should_be_rebuilt(&self) -> Result<bool> {
        if !self.is_healthy() {
            return Ok(true);
        }
        let limit = self.tuning.lock().sort_mem_size.unwrap_or(u64::MAX);
        Ok(self.state.read().pending.size_bytes() > limit)
    }

    fn synchronize(&self, hard: bool, params: &OpenParams) -> Result<()> {
        params.check_keys(SYNC_KEYS, "SkipDBM synchronize")?;
        let reducer = params.get_parsed::<Reducer>("reducer")?.unwrap_or_default();
        let merge_paths: Vec<PathBuf> = params
            .get("merge")
            .unwrap_or_default()
            .split(':')
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();

        if !self.writable {
            if merge_paths.is_empty() {
                return Ok(());
            }
            return Err(Error::not_writable());
        }

        let mut state = self.state.write();
        if state.pending.is_empty() && merge_paths.is_empty() {
            if hard {
                if let Some(lock) = self.lock.lock().as_ref() {
                    lock.file().sync_all()?;
                }
            }
            return Ok(());
        }
        let tuning = self.tuning.lock().clone();
        self.flush(&mut state, &merge_paths, reducer, hard, &tuning)?;
        info!(
            path = %self.path.display(),
            records = state.count,
            merged = merge_paths.len(),
            reducer = %reducer,
            "Synchronized skip database"
        );
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(AtomicOrdering::Relaxed)
    }

    fn is_ordered(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn make_iterator(&self) -> Box<dyn EngineIterator + '_> {
        Box::new(CursorIterator::new(self, SkipCursor { engine: self }))
    }

    fn copy_file(&self, dest: &Path) -> Result<()> {
        let state = self.state.read();
        let tuning = self.tuning.lock().clone();
        self.write_merged(&state, dest, &[], Reducer::default(), true, &tuning)?;
        Ok(())
    }

    fn inspect(&self) -> Vec<(String, String)> {
        let state = self.state.read();
        let mut props = base_properties(
            DbmType::Skip,
            &self.path,
            state.count,
            self.file_size().ok(),
            self.is_healthy(),
        );
        props.push(("num_pending".to_string(), state.pending.len().to_string()));
        props.push((
            "pending_size".to_string(),
            state.pending.size_bytes().to_string(),
        ));
        props.extend(
            Tuning::Skip(self.tuning.lock().clone())
                .to_params()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        props
    }

    fn close(&mut self) -> Result<()> {
        let result = {
            let mut state = self.state.write();
            if self.writable && !state.pending.is_empty() {
                let tuning = self.tuning.lock().clone();
                self.flush(&mut state, &[], Reducer::default(), false, &tuning)
            } else {
                Ok(())
            }
        };
        self.state.get_mut().reader = None;
        self.lock.get_mut().take();
        info!(path = %self.path.display(), "Closed skip database");
        result
    }

    fn dbm_type(&self) -> DbmType {
        DbmType::Skip
    }
}

/// Cursor over the merged view of a skip engine, in byte order.
struct SkipCursor<'a> {
    engine: &'a SkipEngine,
}

impl SkipCursor<'_> {
    /// Walks from `key` in one direction until a key that is not removed.
    fn seek(&self, key: Option<&[u8]>, inclusive: bool, forward: bool) -> Result<Option<Vec<u8>>> {
        let state = self.engine.state.read();
        let mut bound = key.map(<[u8]>::to_vec);
        let mut inclusive = inclusive;
        loop {
            let (from_file, from_pending) = if forward {
                (
                    match &state.reader {
                        Some(reader) => reader.key_after(bound.as_deref(), inclusive)?,
                        None => None,
                    },
                    state.pending.entry_after(bound.as_deref(), inclusive),
                )
            } else {
                (
                    match &state.reader {
                        Some(reader) => reader.key_before(bound.as_deref(), inclusive)?,
                        None => None,
                    },
                    state.pending.entry_before(bound.as_deref(), inclusive),
                )
            };
            let candidate = match (from_file, from_pending) {
                (None, None) => return Ok(None),
                (Some(file_key), None) => file_key,
                (None, Some((pending_key, _))) => pending_key.clone(),
                (Some(file_key), Some((pending_key, _))) => {
                    let nearer = if forward {
                        file_key <= *pending_key
                    } else {
                        file_key >= *pending_key
                    };
                    if nearer {
                        file_key
                    } else {
                        pending_key.clone()
                    }
                }
            };
            if !state.is_removed(&candidate) {
                return Ok(Some(candidate));
            }
            bound = Some(candidate);
            inclusive = false;
        }
    }
}

impl KeyCursor for SkipCursor<'_> {
    fn key_after(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        self.engine.watch(self.seek(key, inclusive, true))
    }

    fn key_before(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        self.engine.watch(self.seek(key, inclusive, false))
    }

    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine.watch(self.engine.state.read().lookup(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydbm_core::StatusCode;
    use tempfile::tempdir;

    fn flags(writable: bool) -> OpenFlags {
        OpenFlags {
            writable,
            ..Default::default()
        }
    }

    fn open(path: &Path, writable: bool) -> SkipEngine {
        SkipEngine::open(path, &flags(writable), &OpenParams::new()).unwrap()
    }

    fn keys(engine: &SkipEngine) -> Vec<String> {
        let mut iter = engine.make_iterator();
        iter.first().unwrap();
        let mut keys = Vec::new();
        while let Some((key, _)) = iter.step().unwrap() {
            keys.push(String::from_utf8(key).unwrap());
        }
        keys
    }

    #[test]
    fn test_pending_updates_visible_and_durable_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tks");
        let mut engine = open(&path, true);
        engine.set(b"b", b"2", true).unwrap();
        engine.set(b"a", b"1", true).unwrap();
        assert_eq!(engine.get(b"a").unwrap(), b"1");
        assert_eq!(engine.count().unwrap(), 2);
        assert_eq!(keys(&engine), vec!["a", "b"]);
        engine.close().unwrap();

        let engine = open(&path, false);
        assert_eq!(engine.count().unwrap(), 2);
        assert_eq!(engine.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn test_removal_shadows_file_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tks");
        let engine = open(&path, true);
        for key in ["a", "b", "c"] {
            engine.set(key.as_bytes(), b"v", true).unwrap();
        }
        engine.synchronize(false, &OpenParams::new()).unwrap();
        engine.remove(b"b").unwrap();
        assert!(engine.get(b"b").unwrap_err().is_not_found());
        assert_eq!(engine.count().unwrap(), 2);
        assert_eq!(keys(&engine), vec!["a", "c"]);

        let mut iter = engine.make_iterator();
        iter.last().unwrap();
        assert_eq!(iter.get_key().unwrap(), b"c");
        iter.previous().unwrap();
        assert_eq!(iter.get_key().unwrap(), b"a");
        iter.jump_upper(b"a", false).unwrap();
        assert_eq!(iter.get_key().unwrap(), b"c");
    }

    #[test]
    fn test_synchronize_merges_with_reducer() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.tks");
        let second = dir.path().join("second.tks");

        let mut other = open(&second, true);
        other.set(b"k", b"theirs", true).unwrap();
        other.set(b"only", b"x", true).unwrap();
        other.close().unwrap();

        let engine = open(&first, true);
        engine.set(b"k", b"mine", true).unwrap();
        let merge = second.to_string_lossy().into_owned();
        engine
            .synchronize(
                false,
                &OpenParams::new()
                    .with("merge", merge.as_str())
                    .with("reducer", "ReduceConcat"),
            )
            .unwrap();
        assert_eq!(engine.get(b"k").unwrap(), b"minetheirs");
        assert_eq!(engine.count().unwrap(), 2);

        engine
            .synchronize(
                false,
                &OpenParams::new()
                    .with("merge", merge.as_str())
                    .with("reducer", "ReduceToFirst"),
            )
            .unwrap();
        assert_eq!(engine.get(b"k").unwrap(), b"minetheirs");

        engine
            .synchronize(false, &OpenParams::new().with("merge", merge.as_str()))
            .unwrap();
        assert_eq!(engine.get(b"k").unwrap(), b"theirs");
    }

    #[test]
    fn test_synchronize_rejects_unknown_params() {
        let dir = tempdir().unwrap();
        let engine = open(&dir.path().join("data.tks"), true);
        let err = engine
            .synchronize(false, &OpenParams::new().with("num_buckets", "10"))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        let err = engine
            .synchronize(false, &OpenParams::new().with("reducer", "ReduceToNowhere"))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_should_be_rebuilt_by_pending_size() {
        let dir = tempdir().unwrap();
        let engine = SkipEngine::open(
            &dir.path().join("data.tks"),
            &flags(true),
            &OpenParams::new().with("sort_mem_size", "64"),
        )
        .unwrap();
        assert!(!engine.should_be_rebuilt().unwrap());
        for i in 0..10 {
            engine
                .set(format!("key{}", i).as_bytes(), b"0123456789", true)
                .unwrap();
        }
        assert!(engine.should_be_rebuilt().unwrap());
        engine.rebuild(&OpenParams::new()).unwrap();
        assert!(!engine.should_be_rebuilt().unwrap());
        assert_eq!(engine.count().unwrap(), 10);
    }

    #[test]
    fn test_clear_and_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tks");
        let copy = dir.path().join("copy.tks");
        let engine = open(&path, true);
        engine.set(b"a", b"1", true).unwrap();
        engine.copy_file(&copy).unwrap();
        engine.clear().unwrap();
        assert_eq!(engine.count().unwrap(), 0);
        assert!(keys(&engine).is_empty());

        let copied = open(&copy, false);
        assert_eq!(copied.get(b"a").unwrap(), b"1");
    }

    #[test]
    fn test_stored_tuning_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tks");
        let mut engine = SkipEngine::open(
            &path,
            &flags(true),
            &OpenParams::new().with("step_unit", "8"),
        )
        .unwrap();
        engine.close().unwrap();

        let engine = open(&path, false);
        let props: std::collections::BTreeMap<_, _> = engine.inspect().into_iter().collect();
        assert_eq!(props["step_unit"], "8");
        assert_eq!(props["class"], "SkipDBM");
    }

    #[test]
    fn test_failed_rebuild_keeps_tuning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tks");
        let engine = open(&path, true);
        engine.set(b"a", b"1", true).unwrap();

        // a directory in the way of the scratch file makes the rewrite fail
        std::fs::create_dir(temp_path(&path)).unwrap();
        assert!(engine
            .rebuild(&OpenParams::new().with("step_unit", "8"))
            .is_err());
        std::fs::remove_dir(temp_path(&path)).unwrap();

        engine.synchronize(false, &OpenParams::new()).unwrap();
        let props: std::collections::BTreeMap<_, _> = engine.inspect().into_iter().collect();
        assert_eq!(props["step_unit"], "4");
        assert_eq!(engine.get(b"a").unwrap(), b"1");

        engine
            .rebuild(&OpenParams::new().with("step_unit", "8"))
            .unwrap();
        let props: std::collections::BTreeMap<_, _> = engine.inspect().into_iter().collect();
        assert_eq!(props["step_unit"], "8");
    }
}
