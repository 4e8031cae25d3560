//! Engine implementations.
//!
//! - [`MemoryEngine`]: records in a table, optionally saved to a snapshot file
//! - [`FileEngine`]: records in a table, every change appended to a record log
//! - [`SkipEngine`]: a sorted file plus pending updates merged on synchronize

use crate::table::RecordTable;
use polydbm_core::{DbmType, Error, Result, Tuning};
use polydbm_log::{replay, LogMeta, LogReader, LogRecord, LogWriter, RecordPayload, Replay, SyncMode};
use std::path::Path;

pub mod file;
pub mod memory;
pub mod skip;

pub use file::FileEngine;
pub use memory::MemoryEngine;
pub use skip::SkipEngine;

/// Outcome of writing a compacted record log.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WrittenLog {
    /// Number of Put frames
    pub frames: u64,
    /// Size of the log in bytes
    pub size: u64,
}

/// Writes every record of `table` to a fresh record log at `path`.
pub(crate) fn write_record_log<T: RecordTable>(
    path: &Path,
    dbm_type: DbmType,
    tuning: &Tuning,
    table: &T,
    hard: bool,
) -> Result<WrittenLog> {
    let mut writer = LogWriter::create(path, SyncMode::None)?;
    writer.append(&LogRecord::meta(LogMeta::new(
        dbm_type.name(),
        &tuning.resolved().to_params(),
    )))?;
    let mut frames = 0;
    table.for_each(&mut |key, value| {
        writer.append(&LogRecord::put(key.to_vec(), value.to_vec()))?;
        frames += 1;
        Ok(())
    })?;
    if hard {
        writer.sync()?;
    } else {
        writer.flush()?;
    }
    Ok(WrittenLog {
        frames,
        size: writer.size(),
    })
}

/// Reads the header of the record log at `path`.
pub(crate) fn read_log_meta(path: &Path) -> Result<LogMeta> {
    let mut reader = LogReader::open(path)?;
    match reader.next_record()? {
        Some(LogRecord {
            payload: RecordPayload::Meta(meta),
            ..
        }) => {
            meta.validate()?;
            Ok(meta)
        }
        _ => Err(Error::Corruption(format!(
            "record log without header: {}",
            path.display()
        ))),
    }
}

/// Replays the record log at `path` into `table`.
pub(crate) fn load_record_log<T: RecordTable>(path: &Path, table: &T) -> Result<Replay> {
    replay(path, |payload| match payload {
        RecordPayload::Put { key, value } => table.load(key, Some(value)),
        RecordPayload::Remove { key } => table.load(key, None),
        RecordPayload::Meta(_) => {}
    })
}

/// Error for operations needing a path on an engine opened without one.
pub(crate) fn path_required(dbm_type: DbmType) -> Error {
    Error::InvalidArgument(format!("{} requires a file path", dbm_type))
}

/// Synchronize parameters are only understood by the skip engine.
pub(crate) fn reject_sync_params(dbm_type: DbmType, params: &polydbm_core::OpenParams) -> Result<()> {
    params.check_keys(&[], &format!("{} synchronize", dbm_type))
}

/// Common leading entries of `inspect`.
pub(crate) fn base_properties(
    dbm_type: DbmType,
    path: &Path,
    num_records: u64,
    file_size: Option<u64>,
    healthy: bool,
) -> Vec<(String, String)> {
    vec![
        ("class".to_string(), dbm_type.name().to_string()),
        ("path".to_string(), path.display().to_string()),
        ("num_records".to_string(), num_records.to_string()),
        (
            "file_size".to_string(),
            file_size.map_or_else(|| "-1".to_string(), |size| size.to_string()),
        ),
        ("healthy".to_string(), healthy.to_string()),
    ]
}
