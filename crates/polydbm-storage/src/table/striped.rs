//! Hash table split into independently locked stripes.
//!
//! Keys are assigned to a stripe by hash; each stripe keeps its records in
//! byte order so that a `(stripe, key)` position can be resumed after the key
//! itself was removed. Iteration walks the stripes in index order.

use super::{decide, tuning_mismatch, ChangeHook, KeyCursor, RecordTable};
use polydbm_core::params::HashTuning;
use polydbm_core::{Processor, RecordAction, Result, Tuning};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, RandomState};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on the number of stripes regardless of the bucket count.
pub const MAX_STRIPES: usize = 1024;

type Stripe = BTreeMap<Vec<u8>, Vec<u8>>;

/// Striped hash table used by the hash file and the tiny in-memory map.
pub struct StripedTable {
    hasher: RandomState,
    stripes: Vec<RwLock<Stripe>>,
    num_buckets: AtomicU64,
}

impl StripedTable {
    /// Creates a table sized for `num_buckets` buckets.
    pub fn new(num_buckets: u64) -> Self {
        let count = num_buckets.clamp(1, MAX_STRIPES as u64) as usize;
        Self {
            hasher: RandomState::new(),
            stripes: (0..count).map(|_| RwLock::new(BTreeMap::new())).collect(),
            num_buckets: AtomicU64::new(num_buckets),
        }
    }

    fn stripe_of(&self, key: &[u8]) -> usize {
        (self.hasher.hash_one(key) % self.stripes.len() as u64) as usize
    }

    /// Number of stripes.
    pub fn num_stripes(&self) -> usize {
        self.stripes.len()
    }

    fn first_from(&self, start: usize) -> Option<Vec<u8>> {
        self.stripes[start..]
            .iter()
            .find_map(|stripe| stripe.read().keys().next().cloned())
    }
}

impl RecordTable for StripedTable {
    type Cursor<'a> = &'a StripedTable;

    fn from_tuning(tuning: &Tuning) -> Result<Self> {
        match tuning {
            Tuning::Hash(t) => Ok(Self::new(
                t.num_buckets.unwrap_or(HashTuning::DEFAULT_NUM_BUCKETS),
            )),
            Tuning::Tiny(t) => Ok(Self::new(
                t.num_buckets.unwrap_or(HashTuning::DEFAULT_NUM_BUCKETS),
            )),
            other => Err(tuning_mismatch("StripedTable", other)),
        }
    }

    fn retune(&self, tuning: &Tuning) -> Result<()> {
        // the stripe count is fixed for the life of the table
        let num_buckets = match tuning {
            Tuning::Hash(t) => t.num_buckets,
            Tuning::Tiny(t) => t.num_buckets,
            other => return Err(tuning_mismatch("StripedTable", other)),
        };
        if let Some(n) = num_buckets {
            self.num_buckets.store(n, Ordering::Relaxed);
        }
        Ok(())
    }

    fn process(
        &self,
        key: &[u8],
        proc: &mut Processor<'_>,
        writable: bool,
        hook: &mut ChangeHook<'_>,
    ) -> Result<()> {
        let stripe = &self.stripes[self.stripe_of(key)];
        if !writable {
            let records = stripe.read();
            decide(key, records.get(key).map(Vec::as_slice), proc, false, hook)?;
            return Ok(());
        }
        let mut records = stripe.write();
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
        let mut records = self.stripes[self.stripe_of(&key)].write();
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
        self.stripes.iter().map(|s| s.read().len() as u64).sum()
    }

    fn clear(&self) {
        for stripe in &self.stripes {
            stripe.write().clear();
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        for stripe in &self.stripes {
            let records = stripe.read();
            for (key, value) in records.iter() {
                f(key, value)?;
            }
        }
        Ok(())
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        self
    }

    fn is_ordered(&self) -> bool {
        false
    }

    fn inspect(&self) -> Vec<(String, String)> {
        vec![
            (
                "num_buckets".to_string(),
                self.num_buckets.load(Ordering::Relaxed).to_string(),
            ),
            ("num_stripes".to_string(), self.stripes.len().to_string()),
        ]
    }
}

impl KeyCursor for &StripedTable {
    fn key_after(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let Some(key) = key else {
            return Ok(self.first_from(0));
        };
        let index = self.stripe_of(key);
        let lower = if inclusive {
            Bound::Included(key)
        } else {
            Bound::Excluded(key)
        };
        let in_stripe = self.stripes[index]
            .read()
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone());
        Ok(in_stripe.or_else(|| self.first_from(index + 1)))
    }

    fn key_before(&self, _key: Option<&[u8]>, _inclusive: bool) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.stripes[self.stripe_of(key)].read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::no_hook;
    use std::collections::HashSet;

    fn put(table: &StripedTable, key: &[u8], value: &[u8]) {
        let value = value.to_vec();
        table
            .process(
                key,
                &mut |_| RecordAction::Set(value.clone()),
                true,
                &mut no_hook,
            )
            .unwrap();
    }

    #[test]
    fn test_stripe_count_is_clamped() {
        assert_eq!(StripedTable::new(0).num_stripes(), 1);
        assert_eq!(StripedTable::new(7).num_stripes(), 7);
        assert_eq!(StripedTable::new(1_048_583).num_stripes(), MAX_STRIPES);
    }

    #[test]
    fn test_process_and_len() {
        let table = StripedTable::new(16);
        put(&table, b"a", b"1");
        put(&table, b"b", b"2");
        put(&table, b"a", b"3");
        assert_eq!(table.len(), 2);
        assert_eq!(table.cursor().fetch(b"a").unwrap(), Some(b"3".to_vec()));
        table
            .process(b"a", &mut |_| RecordAction::Remove, true, &mut no_hook)
            .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_cursor_visits_every_key_once() {
        let table = StripedTable::new(8);
        for i in 0..200u32 {
            put(&table, &i.to_be_bytes(), b"v");
        }
        let cursor = table.cursor();
        let mut seen = HashSet::new();
        let mut position = cursor.key_after(None, true).unwrap();
        while let Some(key) = position {
            assert!(seen.insert(key.clone()), "key visited twice");
            position = cursor.key_after(Some(&key), false).unwrap();
        }
        assert_eq!(seen.len(), 200);
    }

    #[test]
    fn test_cursor_resumes_after_removed_key() {
        let table = StripedTable::new(4);
        for i in 0..50u32 {
            put(&table, &i.to_be_bytes(), b"v");
        }
        let cursor = table.cursor();
        let first = cursor.key_after(None, true).unwrap().unwrap();
        let second = cursor.key_after(Some(&first), false).unwrap();
        table.load(first.clone(), None);
        assert_eq!(cursor.key_after(Some(&first), false).unwrap(), second);
    }

    #[test]
    fn test_retune_rejects_other_types() {
        let table = StripedTable::new(4);
        assert!(table.retune(&Tuning::StdHash).is_err());
    }
}
