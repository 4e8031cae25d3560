// Record log frame format and encoding/decoding
//
// Frame format (binary):
// [length: u32 LE] [type: u8] [payload bytes] [crc32: u32 LE]
//
// Types:
// - PUT (1): key-value insert/update
// - REMOVE (2): key deletion
// - META (3): file header, always the first frame

use crc32fast::Hasher;
use polydbm_core::format::{magic, record_log_version, RECORD_LOG_FORMAT_VERSION};
use polydbm_core::{Error, OpenParams, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on the content length of one frame
pub const MAX_FRAME_LEN: usize = 1 << 30;

/// Bytes of framing around the payload: length, type and crc
pub const FRAME_OVERHEAD: usize = 4 + 1 + 4;

/// Log record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordType {
    Put = 1,
    Remove = 2,
    Meta = 3,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordType::Put),
            2 => Ok(RecordType::Remove),
            3 => Ok(RecordType::Meta),
            _ => Err(Error::Corruption(format!(
                "unknown log record type: {}",
                value
            ))),
        }
    }
}

/// Header describing the database a log belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMeta {
    pub magic: u32,
    pub version: u16,
    /// Class name of the database type
    pub dbm: String,
    /// Effective tuning as parameter pairs
    pub params: Vec<(String, String)>,
}

impl LogMeta {
    pub fn new(dbm: &str, params: &OpenParams) -> Self {
        Self {
            magic: magic::RECORD_LOG,
            version: RECORD_LOG_FORMAT_VERSION,
            dbm: dbm.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Checks the magic number and version.
    pub fn validate(&self) -> Result<()> {
        if self.magic != magic::RECORD_LOG {
            return Err(Error::Corruption(format!(
                "bad record log magic: {:#x}",
                self.magic
            )));
        }
        if !record_log_version().can_read(self.version) {
            return Err(Error::Corruption(format!(
                "unsupported record log version: {}",
                self.version
            )));
        }
        Ok(())
    }

    pub fn open_params(&self) -> OpenParams {
        self.params.iter().cloned().collect()
    }
}

/// Log record payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordPayload {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
    Meta(LogMeta),
}

/// A log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub record_type: RecordType,
    pub payload: RecordPayload,
}

impl LogRecord {
    /// Create a PUT record
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            record_type: RecordType::Put,
            payload: RecordPayload::Put { key, value },
        }
    }

    /// Create a REMOVE record
    pub fn remove(key: Vec<u8>) -> Self {
        Self {
            record_type: RecordType::Remove,
            payload: RecordPayload::Remove { key },
        }
    }

    /// Create a META record
    pub fn meta(meta: LogMeta) -> Self {
        Self {
            record_type: RecordType::Meta,
            payload: RecordPayload::Meta(meta),
        }
    }

    /// Encode record to bytes with framing and CRC
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_bytes = bincode::serialize(&self.payload)
            .map_err(|e| Error::Unknown(format!("failed to serialize log payload: {}", e)))?;

        let type_byte = self.record_type as u8;
        let content_len = 1 + payload_bytes.len();
        if content_len > MAX_FRAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "record too large: {} bytes",
                content_len
            )));
        }

        // CRC covers type + payload
        let mut hasher = Hasher::new();
        hasher.update(&[type_byte]);
        hasher.update(&payload_bytes);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(4 + content_len + 4);
        frame.extend_from_slice(&(content_len as u32).to_le_bytes());
        frame.push(type_byte);
        frame.extend_from_slice(&payload_bytes);
        frame.extend_from_slice(&crc.to_le_bytes());

        Ok(frame)
    }

    /// Decode record from bytes with validation, returning the frame size
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < FRAME_OVERHEAD {
            return Err(Error::Corruption("incomplete record frame".to_string()));
        }

        let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if length == 0 || length > MAX_FRAME_LEN {
            return Err(Error::Corruption(format!(
                "invalid record length: {}",
                length
            )));
        }

        let total_size = 4 + length + 4;
        if data.len() < total_size {
            return Err(Error::Corruption(format!(
                "incomplete record: expected {} bytes, got {}",
                total_size,
                data.len()
            )));
        }

        let type_byte = data[4];
        let payload_bytes = &data[5..4 + length];

        let crc_offset = 4 + length;
        let expected_crc = u32::from_le_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);

        let mut hasher = Hasher::new();
        hasher.update(&[type_byte]);
        hasher.update(payload_bytes);
        let actual_crc = hasher.finalize();

        if actual_crc != expected_crc {
            return Err(Error::Corruption(format!(
                "CRC mismatch: expected {}, got {}",
                expected_crc, actual_crc
            )));
        }

        let record_type = RecordType::try_from(type_byte)?;
        let payload: RecordPayload = bincode::deserialize(payload_bytes)
            .map_err(|e| Error::Corruption(format!("failed to deserialize log payload: {}", e)))?;

        let consistent = matches!(
            (record_type, &payload),
            (RecordType::Put, RecordPayload::Put { .. })
                | (RecordType::Remove, RecordPayload::Remove { .. })
                | (RecordType::Meta, RecordPayload::Meta(_))
        );
        if !consistent {
            return Err(Error::Corruption(
                "record type does not match payload".to_string(),
            ));
        }

        Ok((
            LogRecord {
                record_type,
                payload,
            },
            total_size,
        ))
    }
}
