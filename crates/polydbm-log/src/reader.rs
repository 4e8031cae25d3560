// Log reader module - reads and replays log records
//
// The reader handles:
// 1. Record reading - iterating through the frames of one log file
// 2. CRC validation - verifying data integrity of each frame
// 3. Damage reporting - the offset where readable data ends

use crate::record::{LogMeta, LogRecord, RecordPayload, MAX_FRAME_LEN};
use polydbm_core::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Reader over the frames of a record log
pub struct LogReader {
    reader: BufReader<File>,
    /// Byte offset just past the last frame read successfully
    offset: u64,
}

impl LogReader {
    /// Opens the log at `path` for reading from the start.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
        })
    }

    /// Read the next record from the log
    ///
    /// Returns `Ok(Some(record))` if a record was read successfully,
    /// `Ok(None)` at a clean end of file, or a `Corruption` error if the
    /// frame at the current offset is damaged or torn.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf)?;

        let content_len = u32::from_le_bytes(len_buf) as usize;
        if content_len == 0 || content_len > MAX_FRAME_LEN {
            return Err(Error::Corruption(format!(
                "invalid record length {} at offset {}",
                content_len, self.offset
            )));
        }

        // content (type + payload) and CRC
        let mut frame = vec![0u8; 4 + content_len + 4];
        frame[..4].copy_from_slice(&len_buf);
        self.read_exact(&mut frame[4..])?;

        let (record, consumed) = LogRecord::decode(&frame)?;
        self.offset += consumed as u64;
        Ok(Some(record))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Corruption(format!("truncated record at offset {}", self.offset))
            } else {
                Error::Io(e)
            }
        })
    }

    /// Offset just past the last good frame
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read all remaining records into a vector
    pub fn read_all(&mut self) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Iterator implementation for LogReader
impl Iterator for LogReader {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Outcome of replaying a whole log.
#[derive(Debug)]
pub struct Replay {
    /// Header of the log; `None` for an empty file
    pub meta: Option<LogMeta>,
    /// Length of the readable prefix of the file
    pub valid_len: u64,
    /// Number of Put and Remove frames applied
    pub frames: u64,
    /// Damage that stopped the replay early
    pub damage: Option<Error>,
}

/// Replays the log at `path`, handing every Put/Remove payload to `apply`.
///
/// Damage does not fail the replay: it stops at the first bad frame and is
/// reported in [`Replay::damage`]. I/O errors and a missing or invalid
/// header are returned as errors.
pub fn replay(path: &Path, mut apply: impl FnMut(RecordPayload)) -> Result<Replay> {
    let mut reader = LogReader::open(path)?;
    let meta = match reader.next_record()? {
        None => {
            return Ok(Replay {
                meta: None,
                valid_len: 0,
                frames: 0,
                damage: None,
            })
        }
        Some(LogRecord {
            payload: RecordPayload::Meta(meta),
            ..
        }) => {
            meta.validate()?;
            meta
        }
        Some(_) => {
            return Err(Error::Corruption(
                "record log does not start with a header".to_string(),
            ))
        }
    };

    let mut frames = 0;
    let mut damage = None;
    loop {
        match reader.next_record() {
            Ok(Some(record)) => match record.payload {
                RecordPayload::Meta(_) => {
                    damage = Some(Error::Corruption(format!(
                        "unexpected header at offset {}",
                        reader.offset()
                    )));
                    break;
                }
                payload => {
                    apply(payload);
                    frames += 1;
                }
            },
            Ok(None) => break,
            Err(Error::Io(e)) => return Err(Error::Io(e)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    offset = reader.offset(),
                    error = %e,
                    "Record log damaged, replay stopped"
                );
                damage = Some(e);
                break;
            }
        }
    }

    Ok(Replay {
        meta: Some(meta),
        valid_len: reader.offset(),
        frames,
        damage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogWriter, SyncMode};
    use polydbm_core::OpenParams;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup_test_log() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("casket.tkt");
        (temp_dir, path)
    }

    fn write_log(path: &Path, count: usize) -> u64 {
        let mut writer = LogWriter::create(path, SyncMode::Sync).expect("Failed to create writer");
        writer
            .append(&LogRecord::meta(LogMeta::new("TreeDBM", &OpenParams::new())))
            .expect("Failed to append");
        for i in 0..count {
            writer
                .append(&LogRecord::put(
                    format!("key{}", i).into_bytes(),
                    format!("value{}", i).into_bytes(),
                ))
                .expect("Failed to append");
        }
        writer.size()
    }

    #[test]
    fn test_empty_log_reader() {
        let (_temp_dir, path) = setup_test_log();
        File::create(&path).unwrap();

        let mut reader = LogReader::open(&path).expect("Failed to create reader");
        assert!(reader.next_record().unwrap().is_none());
        let replayed = replay(&path, |_| {}).unwrap();
        assert!(replayed.meta.is_none());
    }

    #[test]
    fn test_read_multiple_records() {
        let (_temp_dir, path) = setup_test_log();
        let size = write_log(&path, 10);

        let mut reader = LogReader::open(&path).expect("Failed to create reader");
        let records = reader.read_all().expect("Failed to read all");

        assert_eq!(records.len(), 11);
        assert_eq!(reader.offset(), size);
    }

    #[test]
    fn test_replay_applies_payloads() {
        let (_temp_dir, path) = setup_test_log();
        write_log(&path, 5);

        let mut keys = Vec::new();
        let replayed = replay(&path, |payload| {
            if let RecordPayload::Put { key, .. } = payload {
                keys.push(key);
            }
        })
        .unwrap();

        assert_eq!(keys.len(), 5);
        assert_eq!(replayed.frames, 5);
        assert!(replayed.damage.is_none());
        assert_eq!(replayed.meta.unwrap().dbm, "TreeDBM");
    }

    #[test]
    fn test_replay_stops_at_torn_tail() {
        let (_temp_dir, path) = setup_test_log();
        let size = write_log(&path, 3);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[40, 0, 0, 0, 1, 2, 3]).unwrap();
        drop(file);

        let replayed = replay(&path, |_| {}).unwrap();
        assert_eq!(replayed.frames, 3);
        assert_eq!(replayed.valid_len, size);
        assert!(replayed.damage.is_some());
    }

    #[test]
    fn test_replay_stops_at_bad_crc() {
        let (_temp_dir, path) = setup_test_log();
        let size = write_log(&path, 4);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0x55;
        std::fs::write(&path, &bytes).unwrap();

        let replayed = replay(&path, |_| {}).unwrap();
        assert_eq!(replayed.frames, 3);
        assert!(replayed.valid_len < size);
        assert!(replayed.damage.is_some());
    }

    #[test]
    fn test_replay_requires_header() {
        let (_temp_dir, path) = setup_test_log();
        let mut writer = LogWriter::create(&path, SyncMode::Sync).unwrap();
        writer
            .append(&LogRecord::put(b"k".to_vec(), b"v".to_vec()))
            .unwrap();
        drop(writer);

        let err = replay(&path, |_| {}).unwrap_err();
        assert_eq!(err.code(), polydbm_core::StatusCode::Corruption);
    }
}
