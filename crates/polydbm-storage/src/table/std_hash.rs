//! Plain hash map behind a single lock.

use super::{decide, tuning_mismatch, ChangeHook, RecordTable, SnapshotCursor, SnapshotSource};
use polydbm_core::{Processor, RecordAction, Result, Tuning};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Hash map table for the std hash database.
#[derive(Default)]
pub struct StdHashTable {
    records: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl StdHashTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSource for StdHashTable {
    fn snapshot_keys(&self) -> Vec<Vec<u8>> {
        self.records.read().keys().cloned().collect()
    }

    fn peek(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.records.read().get(key).cloned()
    }
}

impl RecordTable for StdHashTable {
    type Cursor<'a> = SnapshotCursor<'a, StdHashTable>;

    fn from_tuning(tuning: &Tuning) -> Result<Self> {
        match tuning {
            Tuning::StdHash => Ok(Self::new()),
            other => Err(tuning_mismatch("StdHashTable", other)),
        }
    }

    fn retune(&self, tuning: &Tuning) -> Result<()> {
        match tuning {
            Tuning::StdHash => Ok(()),
            other => Err(tuning_mismatch("StdHashTable", other)),
        }
    }

    fn process(
        &self,
        key: &[u8],
        proc: &mut Processor<'_>,
        writable: bool,
        hook: &mut ChangeHook<'_>,
    ) -> Result<()> {
        if !writable {
            let records = self.records.read();
            decide(key, records.get(key).map(Vec::as_slice), proc, false, hook)?;
            return Ok(());
        }
        let mut records = self.records.write();
        match decide(key, records.get(key).map(Vec::as_slice), proc, true, hook)? {
            RecordAction::Keep => {}
            RecordAction::Set(value) => {
                records.insert(key.to_vec(), value);
            }
            RecordAction::Remove => {
                records.remove(key);
            }
        }
        Ok(())
    }

    fn load(&self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let mut records = self.records.write();
        match value {
            Some(value) => {
                records.insert(key, value);
            }
            None => {
                records.remove(&key);
            }
        }
    }

    fn len(&self) -> u64 {
        self.records.read().len() as u64
    }

    fn clear(&self) {
        self.records.write().clear();
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        let records = self.records.read();
        for (key, value) in records.iter() {
            f(key, value)?;
        }
        Ok(())
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        SnapshotCursor::new(self)
    }

    fn is_ordered(&self) -> bool {
        false
    }
}
