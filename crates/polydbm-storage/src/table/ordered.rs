//! Ordered table keyed through a configurable comparator.

use super::{decide, tuning_mismatch, ChangeHook, KeyCursor, RecordTable};
use polydbm_core::{KeyComparator, Processor, RecordAction, Result, Tuning};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Key wrapper ordering bytes by a comparator.
#[derive(Debug, Clone)]
struct OrderedKey {
    bytes: Vec<u8>,
    comparator: KeyComparator,
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator.compare(&self.bytes, &other.bytes)
    }
}

struct Inner {
    comparator: KeyComparator,
    records: BTreeMap<OrderedKey, Vec<u8>>,
}

impl Inner {
    fn probe(&self, key: &[u8]) -> OrderedKey {
        OrderedKey {
            bytes: key.to_vec(),
            comparator: self.comparator,
        }
    }
}

/// Ordered map used by the tree file and the in-memory ordered maps.
pub struct OrderedTable {
    inner: RwLock<Inner>,
}

impl OrderedTable {
    /// Creates an empty table ordered by `comparator`.
    pub fn new(comparator: KeyComparator) -> Self {
        Self {
            inner: RwLock::new(Inner {
                comparator,
                records: BTreeMap::new(),
            }),
        }
    }

    /// The comparator in effect.
    pub fn comparator(&self) -> KeyComparator {
        self.inner.read().comparator
    }

    fn comparator_of(tuning: &Tuning) -> Result<Option<KeyComparator>> {
        match tuning {
            Tuning::Tree(t) => Ok(t.key_comparator),
            Tuning::Baby(t) => Ok(t.key_comparator),
            Tuning::StdTree => Ok(Some(KeyComparator::Lexical)),
            other => Err(tuning_mismatch("OrderedTable", other)),
        }
    }
}

impl RecordTable for OrderedTable {
    type Cursor<'a> = &'a OrderedTable;

    fn from_tuning(tuning: &Tuning) -> Result<Self> {
        Ok(Self::new(Self::comparator_of(tuning)?.unwrap_or_default()))
    }

    fn retune(&self, tuning: &Tuning) -> Result<()> {
        let Some(comparator) = Self::comparator_of(tuning)? else {
            return Ok(());
        };
        let mut inner = self.inner.write();
        if inner.comparator == comparator {
            return Ok(());
        }
        let records = std::mem::take(&mut inner.records);
        inner.comparator = comparator;
        inner.records = records
            .into_iter()
            .map(|(key, value)| {
                (
                    OrderedKey {
                        bytes: key.bytes,
                        comparator,
                    },
                    value,
                )
            })
            .collect();
        tracing::debug!(comparator = %comparator, "Reordered table");
        Ok(())
    }

    fn process(
        &self,
        key: &[u8],
        proc: &mut Processor<'_>,
        writable: bool,
        hook: &mut ChangeHook<'_>,
    ) -> Result<()> {
        if !writable {
            let inner = self.inner.read();
            let probe = inner.probe(key);
            decide(key, inner.records.get(&probe).map(Vec::as_slice), proc, false, hook)?;
            return Ok(());
        }
        let mut inner = self.inner.write();
        let probe = inner.probe(key);
        match decide(key, inner.records.get(&probe).map(Vec::as_slice), proc, true, hook)? {
            RecordAction::Keep => {}
            RecordAction::Set(value) => {
                inner.records.insert(probe, value);
            }
            RecordAction::Remove => {
                inner.records.remove(&probe);
            }
        }
        Ok(())
    }

    fn load(&self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let mut inner = self.inner.write();
        let probe = OrderedKey {
            bytes: key,
            comparator: inner.comparator,
        };
        match value {
            Some(value) => {
                inner.records.insert(probe, value);
            }
            None => {
                inner.records.remove(&probe);
            }
        }
    }

    fn len(&self) -> u64 {
        self.inner.read().records.len() as u64
    }

    fn clear(&self) {
        self.inner.write().records.clear();
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        let inner = self.inner.read();
        for (key, value) in inner.records.iter() {
            f(&key.bytes, value)?;
        }
        Ok(())
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        self
    }

    fn is_ordered(&self) -> bool {
        true
    }

    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.comparator().compare(a, b)
    }

    fn inspect(&self) -> Vec<(String, String)> {
        vec![("key_comparator".to_string(), self.comparator().to_string())]
    }
}

impl KeyCursor for &OrderedTable {
    fn key_after(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        let found = match key {
            None => inner.records.keys().next(),
            Some(key) => {
                let probe = inner.probe(key);
                let lower = if inclusive {
                    Bound::Included(probe)
                } else {
                    Bound::Excluded(probe)
                };
                inner
                    .records
                    .range((lower, Bound::Unbounded))
                    .next()
                    .map(|(k, _)| k)
            }
        };
        Ok(found.map(|k| k.bytes.clone()))
    }

    fn key_before(&self, key: Option<&[u8]>, inclusive: bool) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        let found = match key {
            None => inner.records.keys().next_back(),
            Some(key) => {
                let probe = inner.probe(key);
                let upper = if inclusive {
                    Bound::Included(probe)
                } else {
                    Bound::Excluded(probe)
                };
                inner
                    .records
                    .range((Bound::Unbounded, upper))
                    .next_back()
                    .map(|(k, _)| k)
            }
        };
        Ok(found.map(|k| k.bytes.clone()))
    }

    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        Ok(inner.records.get(&inner.probe(key)).cloned())
    }
}
