//! Sorted file - the on-disk format of skip databases
//!
//! A sorted file is written once, front to back, from records in ascending
//! key order, and replaced as a whole when pending updates are merged in.
//!
//! ## File Format
//!
//! ```text
//! +------------------+
//! | Data Blocks      |  <- Length-prefixed records, each block CRC-checked
//! +------------------+
//! | Index Block      |  <- First key, offset and size of every data block
//! +------------------+
//! | Footer           |  <- Magic, version, index location, count, tuning, CRC
//! +------------------+
//! | Footer length    |  <- u32 LE
//! +------------------+
//! ```

use parking_lot::Mutex;
use polydbm_core::format::{magic, skip_file_version, SKIP_FILE_FORMAT_VERSION};
use polydbm_core::{Error, OpenParams, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default block size (4KB)
const DEFAULT_BLOCK_SIZE: usize = 4096;

/// A record stored in a sorted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Index entry pointing to a data block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    /// First key in the block
    first_key: Vec<u8>,
    /// Offset of the block in the file
    offset: u64,
    /// Size of the block in bytes, CRC included
    size: u32,
}

/// Footer containing file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SortedFileFooter {
    magic: u32,
    version: u16,
    index_offset: u64,
    index_size: u32,
    record_count: u64,
    /// Effective tuning as parameter pairs
    params: Vec<(String, String)>,
    /// CRC32 of the footer serialized with this field set to zero
    crc: u32,
}

impl SortedFileFooter {
    fn checksum(&self) -> Result<u32> {
        let unsigned = SortedFileFooter {
            crc: 0,
            ..self.clone()
        };
        Ok(crc32fast::hash(&encode(&unsigned)?))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Unknown(format!("serialization failed: {}", e)))
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::Corruption(format!("sorted file: {}", e)))
}

/// Summary of a finished sorted file
#[derive(Debug, Clone)]
pub struct SortedFileMeta {
    pub path: PathBuf,
    pub record_count: u64,
    pub file_size: u64,
}

/// Sorted file writer - creates new sorted files
pub struct SortedFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    position: u64,
    index: Vec<IndexEntry>,
    block_buffer: Vec<u8>,
    block_size: usize,
    current_block_first_key: Option<Vec<u8>>,
    record_count: u64,
    last_key: Option<Vec<u8>>,
}

impl SortedFileWriter {
    /// Create a new sorted file writer
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_block_size(path, DEFAULT_BLOCK_SIZE)
    }

    /// Create a new sorted file writer with custom block size
    pub fn with_block_size(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            position: 0,
            index: Vec::new(),
            block_buffer: Vec::with_capacity(block_size),
            block_size,
            current_block_first_key: None,
            record_count: 0,
            last_key: None,
        })
    }

    /// Add a record; keys must arrive in strictly ascending byte order
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if last.as_slice() >= key {
                return Err(Error::InvalidArgument(
                    "sorted file keys must be strictly ascending".to_string(),
                ));
            }
        }
        self.last_key = Some(key.to_vec());

        if self.current_block_first_key.is_none() {
            self.current_block_first_key = Some(key.to_vec());
        }

        let encoded = encode(&SortedEntry {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;

        // length prefix + record
        self.block_buffer
            .extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        self.block_buffer.extend_from_slice(&encoded);
        self.record_count += 1;

        if self.block_buffer.len() >= self.block_size {
            self.flush_block()?;
        }

        Ok(())
    }

    /// Flush the current block to disk
    fn flush_block(&mut self) -> Result<()> {
        if self.block_buffer.is_empty() {
            return Ok(());
        }

        let crc = crc32fast::hash(&self.block_buffer);

        if let Some(first_key) = self.current_block_first_key.take() {
            self.index.push(IndexEntry {
                first_key,
                offset: self.position,
                size: self.block_buffer.len() as u32 + 4,
            });
        }

        self.writer.write_all(&self.block_buffer)?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.position += self.block_buffer.len() as u64 + 4;

        self.block_buffer.clear();

        Ok(())
    }

    /// Finish writing, recording `params` as the file's tuning
    pub fn finish(mut self, params: &OpenParams, hard: bool) -> Result<SortedFileMeta> {
        self.flush_block()?;

        let index_offset = self.position;
        let index_encoded = encode(&self.index)?;
        self.writer.write_all(&index_encoded)?;
        self.position += index_encoded.len() as u64;

        let mut footer = SortedFileFooter {
            magic: magic::SKIP_FILE,
            version: SKIP_FILE_FORMAT_VERSION,
            index_offset,
            index_size: index_encoded.len() as u32,
            record_count: self.record_count,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            crc: 0,
        };
        footer.crc = footer.checksum()?;
        let footer_encoded = encode(&footer)?;

        self.writer.write_all(&footer_encoded)?;
        self.writer
            .write_all(&(footer_encoded.len() as u32).to_le_bytes())?;
        self.writer.flush()?;
        if hard {
            self.writer.get_ref().sync_all()?;
        }

        Ok(SortedFileMeta {
            path: self.path,
            record_count: self.record_count,
            file_size: self.position + footer_encoded.len() as u64 + 4,
        })
    }
}

/// Decoded blocks kept in memory, bounded by their record count
struct BlockCache {
    blocks: HashMap<usize, Arc<Vec<SortedEntry>>>,
    order: VecDeque<usize>,
    records: u64,
    capacity: u64,
}

impl BlockCache {
    fn insert(&mut self, block_idx: usize, block: Arc<Vec<SortedEntry>>) {
        self.records += block.len() as u64;
        if self.blocks.insert(block_idx, block).is_none() {
            self.order.push_back(block_idx);
        }
        while self.records > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.blocks.remove(&oldest) {
                self.records -= evicted.len() as u64;
            }
        }
    }
}

/// Sorted file reader - reads from existing sorted files
pub struct SortedFileReader {
    path: PathBuf,
    file: Mutex<File>,
    index: Vec<IndexEntry>,
    footer: SortedFileFooter,
    file_size: u64,
    cache: Mutex<BlockCache>,
}

impl SortedFileReader {
    /// Open a sorted file, caching up to `max_cached_records` decoded records
    pub fn open(path: impl AsRef<Path>, max_cached_records: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("no such file: {}", path.display()))
            }
            _ => Error::Io(e),
        })?;

        let file_size = file.metadata()?.len();
        if file_size < 4 {
            return Err(Error::Corruption(format!(
                "sorted file too small: {}",
                path.display()
            )));
        }

        // footer length (last 4 bytes)
        file.seek(SeekFrom::End(-4))?;
        let mut footer_len_buf = [0u8; 4];
        file.read_exact(&mut footer_len_buf)?;
        let footer_len = u64::from(u32::from_le_bytes(footer_len_buf));
        if footer_len + 4 > file_size {
            return Err(Error::Corruption("invalid sorted file footer length".into()));
        }

        file.seek(SeekFrom::Start(file_size - 4 - footer_len))?;
        let mut footer_buf = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer_buf)?;
        let footer: SortedFileFooter = decode(&footer_buf)?;

        if footer.magic != magic::SKIP_FILE {
            return Err(Error::Corruption("invalid sorted file magic number".into()));
        }
        if !skip_file_version().can_read(footer.version) {
            return Err(Error::Corruption(format!(
                "unsupported sorted file version: {}",
                footer.version
            )));
        }
        if footer.checksum()? != footer.crc {
            return Err(Error::Corruption("sorted file footer CRC mismatch".into()));
        }
        if footer.index_offset + u64::from(footer.index_size) > file_size - 4 - footer_len {
            return Err(Error::Corruption("sorted file index out of range".into()));
        }

        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index_buf = vec![0u8; footer.index_size as usize];
        file.read_exact(&mut index_buf)?;
        let index: Vec<IndexEntry> = decode(&index_buf)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            index,
            footer,
            file_size,
            cache: Mutex::new(BlockCache {
                blocks: HashMap::new(),
                order: VecDeque::new(),
                records: 0,
                capacity: max_cached_records,
            }),
        })
    }

    /// Read and decode a data block, bypassing the cache
    fn load_block(&self, block_idx: usize) -> Result<Vec<SortedEntry>> {
        let index_entry = &self.index[block_idx];
        if index_entry.size < 4 {
            return Err(Error::Corruption("sorted file block too small".into()));
        }

        let data_size = index_entry.size as usize - 4;
        let mut data_buf = vec![0u8; data_size];
        let mut crc_buf = [0u8; 4];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(index_entry.offset))?;
            file.read_exact(&mut data_buf)?;
            file.read_exact(&mut crc_buf)?;
        }

        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&data_buf) {
            return Err(Error::Corruption(format!(
                "block CRC mismatch at offset {}",
                index_entry.offset
            )));
        }

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < data_buf.len() {
            if offset + 4 > data_buf.len() {
                return Err(Error::Corruption("truncated block record".into()));
            }
            let len = u32::from_le_bytes([
                data_buf[offset],
                data_buf[offset + 1],
                data_buf[offset + 2],
                data_buf[offset + 3],
            ]) as usize;
            offset += 4;
            if offset + len > data_buf.len() {
                return Err(Error::Corruption("truncated block record".into()));
            }
            entries.push(decode(&data_buf[offset..offset + len])?);
            offset += len;
        }

        Ok(entries)
    }

    /// Read a data block through the cache
    fn read_block(&self, block_idx: usize) -> Result<Arc<Vec<SortedEntry>>> {
        if let Some(block) = self.cache.lock().blocks.get(&block_idx) {
            return Ok(Arc::clone(block));
        }
        let block = Arc::new(self.load_block(block_idx)?);
        self.cache.lock().insert(block_idx, Arc::clone(&block));
        Ok(block)
    }

    /// Index of the last block whose first key is <= `key`
    fn block_for(&self, key: &[u8]) -> usize {
        self.index
            .partition_point(|entry| entry.first_key.as_slice() <= key)
            .saturating_sub(1)
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.index.is_empty() {
            return Ok(None);
        }
        let block = self.read_block(self.block_for(key))?;
        Ok(block
            .binary_search_by(|entry| entry.key.as_slice().cmp(key))
            .ok()
            .map(|i| block[i].value.clone()))
    }

    /// First key at or after `key` (strictly after unless `inclusive`)
    pub fn key_after(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let start = key.map_or(0, |k| self.block_for(k));
        for block_idx in start..self.index.len() {
            let block = self.read_block(block_idx)?;
            let found = block.iter().find(|entry| match key {
                None => true,
                Some(k) if inclusive => entry.key.as_slice() >= k,
                Some(k) => entry.key.as_slice() > k,
            });
            if let Some(entry) = found {
                return Ok(Some(entry.key.clone()));
            }
        }
        Ok(None)
    }

    /// Last key at or before `key` (strictly before unless `inclusive`)
    pub fn key_before(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let end = match key {
            None => self.index.len(),
            Some(k) => self
                .index
                .partition_point(|entry| entry.first_key.as_slice() <= k),
        };
        for block_idx in (0..end).rev() {
            let block = self.read_block(block_idx)?;
            let found = block.iter().rev().find(|entry| match key {
                None => true,
                Some(k) if inclusive => entry.key.as_slice() <= k,
                Some(k) => entry.key.as_slice() < k,
            });
            if let Some(entry) = found {
                return Ok(Some(entry.key.clone()));
            }
        }
        Ok(None)
    }

    /// Number of records in the file
    pub fn record_count(&self) -> u64 {
        self.footer.record_count
    }

    /// Tuning recorded when the file was written
    pub fn params(&self) -> OpenParams {
        self.footer.params.iter().cloned().collect()
    }

    /// File size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate over all records in key order, without filling the cache
    pub fn iter(&self) -> SortedFileIterator<'_> {
        SortedFileIterator {
            reader: self,
            block_idx: 0,
            block_entries: Vec::new().into_iter(),
        }
    }
}

/// Iterator over sorted file records
pub struct SortedFileIterator<'a> {
    reader: &'a SortedFileReader,
    block_idx: usize,
    block_entries: std::vec::IntoIter<SortedEntry>,
}

impl SortedFileIterator<'_> {
    /// Get the next record
    pub fn next_entry(&mut self) -> Result<Option<SortedEntry>> {
        loop {
            if let Some(entry) = self.block_entries.next() {
                return Ok(Some(entry));
            }
            if self.block_idx >= self.reader.index.len() {
                return Ok(None);
            }
            self.block_entries = self.reader.load_block(self.block_idx)?.into_iter();
            self.block_idx += 1;
        }
    }
}
