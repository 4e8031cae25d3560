//! K-way merge of sorted record streams with duplicate reduction.
//!
//! Used by the skip engine to fold its pending updates into the sorted
//! file and to merge other skip files in on synchronize.

use crate::memtable::{Memtable, MemtableEntry};
use crate::sorted_file::SortedFileIterator;
use polydbm_core::comparator::parse_decimal;
use polydbm_core::{Error, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::iter::Peekable;
use std::str::FromStr;

/// How the values of a key found in several sources become one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reducer {
    /// Keep the first value
    First,
    /// Keep the second value, or the first when there is only one
    Second,
    /// Keep the last value
    #[default]
    Last,
    /// Concatenate all values
    Concat,
    /// Concatenate with a NUL byte in between
    ConcatWithNull,
    /// Concatenate with a tab in between
    ConcatWithTab,
    /// Concatenate with a line feed in between
    ConcatWithLine,
    /// Sum the values as decimal integers
    Total,
}

impl Reducer {
    /// All reducers.
    pub const ALL: [Reducer; 8] = [
        Reducer::First,
        Reducer::Second,
        Reducer::Last,
        Reducer::Concat,
        Reducer::ConcatWithNull,
        Reducer::ConcatWithTab,
        Reducer::ConcatWithLine,
        Reducer::Total,
    ];

    /// Returns the parameter spelling.
    pub fn name(&self) -> &'static str {
        match self {
            Reducer::First => "ReduceToFirst",
            Reducer::Second => "ReduceToSecond",
            Reducer::Last => "ReduceToLast",
            Reducer::Concat => "ReduceConcat",
            Reducer::ConcatWithNull => "ReduceConcatWithNull",
            Reducer::ConcatWithTab => "ReduceConcatWithTab",
            Reducer::ConcatWithLine => "ReduceConcatWithLine",
            Reducer::Total => "ReduceToTotal",
        }
    }

    fn join(values: Vec<Vec<u8>>, delim: &[u8]) -> Vec<u8> {
        let mut joined = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                joined.extend_from_slice(delim);
            }
            joined.extend_from_slice(&value);
        }
        joined
    }

    /// Folds `values`, given in source order, into one; `values` is never empty.
    pub fn reduce(&self, mut values: Vec<Vec<u8>>) -> Vec<u8> {
        match self {
            Reducer::First => values.swap_remove(0),
            Reducer::Second if values.len() > 1 => values.swap_remove(1),
            Reducer::Second => values.swap_remove(0),
            Reducer::Last => values.pop().unwrap_or_default(),
            Reducer::Concat => Self::join(values, b""),
            Reducer::ConcatWithNull => Self::join(values, b"\0"),
            Reducer::ConcatWithTab => Self::join(values, b"\t"),
            Reducer::ConcatWithLine => Self::join(values, b"\n"),
            Reducer::Total => values
                .iter()
                .fold(0i64, |sum, value| sum.wrapping_add(parse_decimal(value)))
                .to_string()
                .into_bytes(),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Reducer::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown reducer: {}", s)))
    }
}

/// A stream of records in strictly ascending key order.
pub trait MergeSource {
    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}

impl MergeSource for SortedFileIterator<'_> {
    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.next_entry()?.map(|entry| (entry.key, entry.value)))
    }
}

/// Live view of a sorted file with pending updates laid over it.
pub struct OverlaySource<'a> {
    base: Option<SortedFileIterator<'a>>,
    base_head: Option<(Vec<u8>, Vec<u8>)>,
    pending: Peekable<std::collections::btree_map::Iter<'a, Vec<u8>, MemtableEntry>>,
}

impl<'a> OverlaySource<'a> {
    /// Overlays `pending` on `base`; a missing base is an empty file.
    pub fn new(base: Option<SortedFileIterator<'a>>, pending: &'a Memtable) -> Result<Self> {
        let mut source = Self {
            base,
            base_head: None,
            pending: pending.iter().peekable(),
        };
        source.advance_base()?;
        Ok(source)
    }

    fn advance_base(&mut self) -> Result<()> {
        self.base_head = match &mut self.base {
            Some(base) => base.next_record()?,
            None => None,
        };
        Ok(())
    }
}

impl MergeSource for OverlaySource<'_> {
    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let order = match (&self.base_head, self.pending.peek()) {
                (None, None) => return Ok(None),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((base_key, _)), Some((pending_key, _))) => base_key.cmp(pending_key),
            };
            if order == Ordering::Less {
                let record = self.base_head.take();
                self.advance_base()?;
                return Ok(record);
            }
            if order == Ordering::Equal {
                // shadowed by the pending entry
                self.advance_base()?;
            }
            if let Some((key, entry)) = self.pending.next() {
                if let MemtableEntry::Value(value) = entry {
                    return Ok(Some((key.clone(), value.clone())));
                }
            }
        }
    }
}

/// Entry in the merge heap
struct MergeEntry {
    key: Vec<u8>,
    value: Vec<u8>,
    source_idx: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source_idx == other.source_idx
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: smallest key first, then lowest source index
        match other.key.cmp(&self.key) {
            Ordering::Equal => other.source_idx.cmp(&self.source_idx),
            ord => ord,
        }
    }
}

/// Merges `sources` in key order, handing each distinct key with its reduced
/// value to `emit`. Returns the number of records emitted.
pub fn merge_sources(
    sources: &mut [Box<dyn MergeSource + '_>],
    reducer: Reducer,
    mut emit: impl FnMut(&[u8], &[u8]) -> Result<()>,
) -> Result<u64> {
    let mut heap = BinaryHeap::new();
    for (source_idx, source) in sources.iter_mut().enumerate() {
        if let Some((key, value)) = source.next_record()? {
            heap.push(MergeEntry {
                key,
                value,
                source_idx,
            });
        }
    }

    let mut emitted = 0;
    while let Some(head) = heap.pop() {
        let key = head.key;
        let mut values = vec![head.value];
        let mut drained = vec![head.source_idx];
        while heap.peek().is_some_and(|next| next.key == key) {
            if let Some(next) = heap.pop() {
                values.push(next.value);
                drained.push(next.source_idx);
            }
        }

        let value = if values.len() == 1 {
            values.swap_remove(0)
        } else {
            reducer.reduce(values)
        };
        emit(&key, &value)?;
        emitted += 1;

        for source_idx in drained {
            if let Some((key, value)) = sources[source_idx].next_record()? {
                heap.push(MergeEntry {
                    key,
                    value,
                    source_idx,
                });
            }
        }
    }
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource(std::vec::IntoIter<(Vec<u8>, Vec<u8>)>);

    impl VecSource {
        fn boxed(records: &[(&str, &str)]) -> Box<dyn MergeSource> {
            let records: Vec<_> = records
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect();
            Box::new(VecSource(records.into_iter()))
        }
    }

    impl MergeSource for VecSource {
        fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
            Ok(self.0.next())
        }
    }

    fn merged(sources: Vec<Box<dyn MergeSource>>, reducer: Reducer) -> Vec<(String, String)> {
        let mut sources = sources;
        let mut out = Vec::new();
        merge_sources(&mut sources, reducer, |k, v| {
            out.push((
                String::from_utf8_lossy(k).into_owned(),
                String::from_utf8_lossy(v).into_owned(),
            ));
            Ok(())
        })
        .unwrap();
        out
    }

    fn three_sources() -> Vec<Box<dyn MergeSource>> {
        vec![
            VecSource::boxed(&[("a", "1"), ("c", "1")]),
            VecSource::boxed(&[("b", "2"), ("c", "2")]),
            VecSource::boxed(&[("c", "3"), ("d", "3")]),
        ]
    }

    #[test]
    fn test_merge_order_and_reducers() {
        let pairs = |v: &[(&str, &str)]| -> Vec<(String, String)> {
            v.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        assert_eq!(
            merged(three_sources(), Reducer::First),
            pairs(&[("a", "1"), ("b", "2"), ("c", "1"), ("d", "3")])
        );
        assert_eq!(merged(three_sources(), Reducer::Second)[2].1, "2");
        assert_eq!(merged(three_sources(), Reducer::Last)[2].1, "3");
        assert_eq!(merged(three_sources(), Reducer::Concat)[2].1, "123");
        assert_eq!(merged(three_sources(), Reducer::ConcatWithTab)[2].1, "1\t2\t3");
        assert_eq!(merged(three_sources(), Reducer::ConcatWithLine)[2].1, "1\n2\n3");
        assert_eq!(merged(three_sources(), Reducer::ConcatWithNull)[2].1, "1\x002\x003");
        assert_eq!(merged(three_sources(), Reducer::Total)[2].1, "6");
    }

    #[test]
    fn test_single_value_untouched_by_reducer() {
        let out = merged(vec![VecSource::boxed(&[("k", "abc")])], Reducer::Total);
        assert_eq!(out, vec![("k".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_reducer_names() {
        for reducer in Reducer::ALL {
            assert_eq!(reducer.name().parse::<Reducer>().unwrap(), reducer);
        }
        assert!("ReduceToNothing".parse::<Reducer>().is_err());
        assert_eq!(Reducer::default(), Reducer::Last);
    }

    #[test]
    fn test_total_parses_signs_and_garbage() {
        let values = vec![b"10".to_vec(), b"-3".to_vec(), b"x".to_vec()];
        assert_eq!(Reducer::Total.reduce(values), b"7");
    }

    #[test]
    fn test_overlay_shadows_and_removes() {
        let mut pending = Memtable::new();
        pending.put(b"b".to_vec(), b"new".to_vec());
        pending.delete(b"c".to_vec());
        pending.put(b"e".to_vec(), b"5".to_vec());
        pending.delete(b"z".to_vec());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.tks");
        let mut writer = crate::sorted_file::SortedFileWriter::new(&path).unwrap();
        for key in ["a", "b", "c", "d"] {
            writer.add(key.as_bytes(), b"old").unwrap();
        }
        writer
            .finish(&polydbm_core::OpenParams::new(), false)
            .unwrap();
        let reader = crate::sorted_file::SortedFileReader::open(&path, 16).unwrap();

        let mut overlay = OverlaySource::new(Some(reader.iter()), &pending).unwrap();
        let mut out = Vec::new();
        while let Some((k, v)) = overlay.next_record().unwrap() {
            out.push((String::from_utf8(k).unwrap(), String::from_utf8(v).unwrap()));
        }
        let expected: Vec<(String, String)> = [("a", "old"), ("b", "new"), ("d", "old"), ("e", "5")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(out, expected);
    }
}
