//! Bounded table evicting the least recently used records.
//!
//! Every access through `process` refreshes the record. After a write the
//! oldest records are dropped until both the record count and the memory
//! capacity hold.

use super::{decide, tuning_mismatch, ChangeHook, RecordTable, SnapshotCursor, SnapshotSource};
use polydbm_core::params::CacheTuning;
use polydbm_core::{Processor, RecordAction, Result, Tuning};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

struct Slot {
    value: Vec<u8>,
    stamp: u64,
}

struct LruState {
    records: HashMap<Vec<u8>, Slot>,
    /// access stamp -> key, oldest first
    recency: BTreeMap<u64, Vec<u8>>,
    clock: u64,
    mem_size: u64,
    cap_rec_num: u64,
    cap_mem_size: Option<u64>,
    evictions: u64,
}

fn footprint(key: &[u8], value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}

impl LruState {
    fn touch(&mut self, key: &[u8]) {
        self.clock += 1;
        let stamp = self.clock;
        if let Some(slot) = self.records.get_mut(key) {
            let old = std::mem::replace(&mut slot.stamp, stamp);
            if let Some(k) = self.recency.remove(&old) {
                self.recency.insert(stamp, k);
            }
        }
    }

    fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.clock += 1;
        let stamp = self.clock;
        self.mem_size += footprint(&key, &value);
        if let Some(old) = self.records.insert(key.clone(), Slot { value, stamp }) {
            self.recency.remove(&old.stamp);
            self.mem_size -= footprint(&key, &old.value);
        }
        self.recency.insert(stamp, key);
        self.evict();
    }

    fn remove(&mut self, key: &[u8]) {
        if let Some(old) = self.records.remove(key) {
            self.recency.remove(&old.stamp);
            self.mem_size -= footprint(key, &old.value);
        }
    }

    fn over_capacity(&self) -> bool {
        self.records.len() as u64 > self.cap_rec_num
            || self.cap_mem_size.is_some_and(|cap| self.mem_size > cap)
    }

    fn evict(&mut self) {
        while self.over_capacity() {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(old) = self.records.remove(&key) {
                self.mem_size -= footprint(&key, &old.value);
                self.evictions += 1;
            }
        }
    }
}

/// LRU table for the cache database.
pub struct LruTable {
    state: Mutex<LruState>,
}

impl LruTable {
    /// Creates a cache holding at most `cap_rec_num` records and, when set,
    /// `cap_mem_size` bytes of keys and values.
    pub fn new(cap_rec_num: u64, cap_mem_size: Option<u64>) -> Self {
        Self {
            state: Mutex::new(LruState {
                records: HashMap::new(),
                recency: BTreeMap::new(),
                clock: 0,
                mem_size: 0,
                cap_rec_num: cap_rec_num.max(1),
                cap_mem_size,
                evictions: 0,
            }),
        }
    }
}

impl SnapshotSource for LruTable {
    fn snapshot_keys(&self) -> Vec<Vec<u8>> {
        self.state.lock().records.keys().cloned().collect()
    }

    fn peek(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.lock().records.get(key).map(|slot| slot.value.clone())
    }
}

impl RecordTable for LruTable {
    type Cursor<'a> = SnapshotCursor<'a, LruTable>;

    fn from_tuning(tuning: &Tuning) -> Result<Self> {
        match tuning {
            Tuning::Cache(t) => Ok(Self::new(
                t.cap_rec_num.unwrap_or(CacheTuning::DEFAULT_CAP_REC_NUM),
                t.cap_mem_size,
            )),
            other => Err(tuning_mismatch("LruTable", other)),
        }
    }

    fn retune(&self, tuning: &Tuning) -> Result<()> {
        let Tuning::Cache(t) = tuning else {
            return Err(tuning_mismatch("LruTable", tuning));
        };
        let mut state = self.state.lock();
        if let Some(cap) = t.cap_rec_num {
            state.cap_rec_num = cap.max(1);
        }
        if t.cap_mem_size.is_some() {
            state.cap_mem_size = t.cap_mem_size;
        }
        state.evict();
        Ok(())
    }

    fn process(
        &self,
        key: &[u8],
        proc: &mut Processor<'_>,
        writable: bool,
        hook: &mut ChangeHook<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.touch(key);
        let current = state.records.get(key).map(|slot| slot.value.as_slice());
        match decide(key, current, proc, writable, hook)? {
            RecordAction::Keep => {}
            RecordAction::Set(value) => state.insert(key.to_vec(), value),
            RecordAction::Remove => state.remove(key),
        }
        Ok(())
    }

    fn load(&self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let mut state = self.state.lock();
        match value {
            Some(value) => state.insert(key, value),
            None => state.remove(&key),
        }
    }

    fn len(&self) -> u64 {
        self.state.lock().records.len() as u64
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.recency.clear();
        state.mem_size = 0;
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        let state = self.state.lock();
        // oldest first, so reloading the dump restores the recency order
        for key in state.recency.values() {
            if let Some(slot) = state.records.get(key) {
                f(key, &slot.value)?;
            }
        }
        Ok(())
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        SnapshotCursor::new(self)
    }

    fn is_ordered(&self) -> bool {
        false
    }

    fn inspect(&self) -> Vec<(String, String)> {
        let state = self.state.lock();
        vec![
            ("cap_rec_num".to_string(), state.cap_rec_num.to_string()),
            (
                "cap_mem_size".to_string(),
                state
                    .cap_mem_size
                    .map_or_else(|| "unlimited".to_string(), |cap| cap.to_string()),
            ),
            ("mem_size".to_string(), state.mem_size.to_string()),
            ("num_evictions".to_string(), state.evictions.to_string()),
        ]
    }
}
