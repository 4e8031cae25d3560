// Log writer module - appends framed records to a single log file
use crate::record::LogRecord;
use crate::SyncMode;
use polydbm_core::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct LogWriter {
    file: BufWriter<File>,
    path: PathBuf,
    size: u64,
    sync_mode: SyncMode,
}

impl LogWriter {
    /// Creates a new log at `path`, replacing any existing file.
    pub fn create(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            size: 0,
            sync_mode,
        })
    }

    /// Reopens an existing log for appending after its first `valid_len`
    /// bytes; anything beyond is cut off.
    pub fn resume(path: &Path, valid_len: u64, sync_mode: SyncMode) -> Result<Self> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        if file.metadata()?.len() != valid_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "Truncating unreadable tail of record log"
            );
            file.set_len(valid_len)?;
        }
        file.seek(SeekFrom::Start(valid_len))?;
        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            size: valid_len,
            sync_mode,
        })
    }

    /// Appends a record and returns the log size after it.
    pub fn append(&mut self, record: &LogRecord) -> Result<u64> {
        let encoded = record.encode()?;
        self.file.write_all(&encoded)?;
        self.size += encoded.len() as u64;

        match self.sync_mode {
            SyncMode::Sync => self.sync()?,
            SyncMode::Async => self.file.flush()?,
            SyncMode::None => {}
        }

        Ok(self.size)
    }

    /// Pushes buffered frames to the operating system.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flushes and forces the data onto the device.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Get the log path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the log size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the underlying file, e.g. to take a file lock on it
    pub fn file(&self) -> &File {
        self.file.get_ref()
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.file.flush();
    }
}
