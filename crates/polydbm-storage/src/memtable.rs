//! Memtable - pending updates of a skip database
//!
//! Updates to a skip database are collected here, visible to readers at
//! once, until the next synchronize or rebuild merges them into the sorted
//! file. Removals of records that live in the file are kept as tombstones.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Entry value in the memtable - can be a value or a tombstone (deletion marker)
#[derive(Debug, Clone, PartialEq)]
pub enum MemtableEntry {
    /// A live value
    Value(Vec<u8>),
    /// A tombstone marking deletion
    Tombstone,
}

impl MemtableEntry {
    /// Returns the size of this entry in bytes
    pub fn size(&self) -> usize {
        match self {
            MemtableEntry::Value(v) => v.len() + 1, // +1 for type tag
            MemtableEntry::Tombstone => 1,
        }
    }

    /// The value, unless this is a tombstone
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            MemtableEntry::Value(v) => Some(v),
            MemtableEntry::Tombstone => None,
        }
    }
}

/// Sorted buffer of pending updates
#[derive(Debug, Default)]
pub struct Memtable {
    data: BTreeMap<Vec<u8>, MemtableEntry>,
    /// Approximate size in bytes, compared against `sort_mem_size`
    size_bytes: u64,
}

impl Memtable {
    /// Creates a new empty Memtable
    pub fn new() -> Self {
        Self::default()
    }

    fn replace(&mut self, key: Vec<u8>, entry: MemtableEntry) {
        let key_size = key.len() as u64;
        let new_size = entry.size() as u64;
        if let Some(old) = self.data.insert(key, entry) {
            self.size_bytes -= key_size + old.size() as u64;
        }
        self.size_bytes += key_size + new_size;
    }

    /// Inserts or updates a key-value pair
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.replace(key, MemtableEntry::Value(value));
    }

    /// Marks a key as deleted with a tombstone
    pub fn delete(&mut self, key: Vec<u8>) {
        self.replace(key, MemtableEntry::Tombstone);
    }

    /// Retrieves an entry by key
    ///
    /// Returns:
    /// - `Some(Some(value))` if the key exists with a value
    /// - `Some(None)` if the key was deleted (tombstone)
    /// - `None` if the key is not in the memtable
    pub fn get(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.data.get(key).map(MemtableEntry::value)
    }

    /// First entry at or after `key` (strictly after unless `inclusive`)
    pub fn entry_after(
        &self,
        key: Option<&[u8]>,
        inclusive: bool,
    ) -> Option<(&Vec<u8>, &MemtableEntry)> {
        let lower = match key {
            None => Bound::Unbounded,
            Some(key) if inclusive => Bound::Included(key),
            Some(key) => Bound::Excluded(key),
        };
        self.data
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
    }

    /// Last entry at or before `key` (strictly before unless `inclusive`)
    pub fn entry_before(
        &self,
        key: Option<&[u8]>,
        inclusive: bool,
    ) -> Option<(&Vec<u8>, &MemtableEntry)> {
        let upper = match key {
            None => Bound::Unbounded,
            Some(key) if inclusive => Bound::Included(key),
            Some(key) => Bound::Excluded(key),
        };
        self.data
            .range::<[u8], _>((Bound::Unbounded, upper))
            .next_back()
    }

    /// Returns the approximate size of the memtable in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Returns the number of entries in the memtable
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the memtable is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an iterator over all entries in sorted order
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, Vec<u8>, MemtableEntry> {
        self.data.iter()
    }

    /// Clears the memtable
    pub fn clear(&mut self) {
        self.data.clear();
        self.size_bytes = 0;
    }
}
