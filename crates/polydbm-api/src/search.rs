//! Key search over a full iterator pass.

use polydbm_core::{Engine, Error, Result};
use regex::bytes::RegexBuilder;
use regex::Regex;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

/// How a search pattern is matched against keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Key contains the pattern
    Contain,
    /// Key starts with the pattern
    Begin,
    /// Key ends with the pattern
    End,
    /// Key matches the regular expression
    Regex,
    /// Keys closest to the pattern by Levenshtein distance
    Edit,
}

impl SearchMode {
    /// Mode name as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            SearchMode::Contain => "contain",
            SearchMode::Begin => "begin",
            SearchMode::End => "end",
            SearchMode::Regex => "regex",
            SearchMode::Edit => "edit",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contain" => Ok(SearchMode::Contain),
            "begin" => Ok(SearchMode::Begin),
            "end" => Ok(SearchMode::End),
            "regex" => Ok(SearchMode::Regex),
            "edit" => Ok(SearchMode::Edit),
            _ => Err(Error::InvalidArgument(format!("unknown search mode: {}", s))),
        }
    }
}

enum Matcher {
    Contain(Vec<u8>),
    Begin(Vec<u8>),
    End(Vec<u8>),
    Text(Regex),
    Bytes(regex::bytes::Regex),
}

impl Matcher {
    fn build(mode: SearchMode, pattern: &[u8], utf: bool) -> Result<Self> {
        Ok(match mode {
            SearchMode::Contain => Matcher::Contain(pattern.to_vec()),
            SearchMode::Begin => Matcher::Begin(pattern.to_vec()),
            SearchMode::End => Matcher::End(pattern.to_vec()),
            SearchMode::Regex => {
                let invalid = |e: regex::Error| Error::InvalidArgument(format!("invalid regex: {}", e));
                if utf {
                    Matcher::Text(Regex::new(&String::from_utf8_lossy(pattern)).map_err(invalid)?)
                } else {
                    let pattern = std::str::from_utf8(pattern).map_err(|_| {
                        Error::InvalidArgument("regex pattern must be valid UTF-8".to_string())
                    })?;
                    Matcher::Bytes(
                        RegexBuilder::new(pattern)
                            .unicode(false)
                            .build()
                            .map_err(invalid)?,
                    )
                }
            }
            SearchMode::Edit => {
                return Err(Error::InvalidArgument("edit search has no matcher".to_string()))
            }
        })
    }

    fn is_match(&self, key: &[u8]) -> bool {
        match self {
            Matcher::Contain(pattern) => {
                pattern.is_empty() || key.windows(pattern.len()).any(|window| window == pattern.as_slice())
            }
            Matcher::Begin(pattern) => key.starts_with(pattern),
            Matcher::End(pattern) => key.ends_with(pattern),
            Matcher::Text(regex) => regex.is_match(&String::from_utf8_lossy(key)),
            Matcher::Bytes(regex) => regex.is_match(key),
        }
    }
}

/// Levenshtein distance between two symbol sequences.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, x) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(x != y);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

/// Bounded set of the keys closest to the pattern.
struct Nearest {
    capacity: usize,
    // max-heap on (distance, arrival) so the worst candidate is evicted first
    heap: BinaryHeap<(usize, u64, Vec<u8>)>,
    arrivals: u64,
}

impl Nearest {
    fn offer(&mut self, distance: usize, key: Vec<u8>) {
        let arrival = self.arrivals;
        self.arrivals += 1;
        if self.capacity > 0 && self.heap.len() >= self.capacity {
            match self.heap.peek() {
                Some((worst, _, _)) if *worst > distance => {
                    self.heap.pop();
                }
                _ => return,
            }
        }
        self.heap.push((distance, arrival, key));
    }

    fn into_keys(self) -> Vec<Vec<u8>> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(_, _, key)| key)
            .collect()
    }
}

/// Collects the keys nearest to `pattern` into `out`, nearest first. The
/// candidates gathered before a failing read are still written out.
fn edit_search(
    engine: &dyn Engine,
    pattern: &[u8],
    capacity: usize,
    utf: bool,
    out: &mut Vec<Vec<u8>>,
) -> Result<()> {
    let pattern_chars: Vec<char> = String::from_utf8_lossy(pattern).chars().collect();
    let mut nearest = Nearest {
        capacity,
        heap: BinaryHeap::new(),
        arrivals: 0,
    };
    let mut scan = || -> Result<()> {
        let mut iter = engine.make_iterator();
        iter.first()?;
        while let Some((key, _)) = iter.step()? {
            let distance = if utf {
                let chars: Vec<char> = String::from_utf8_lossy(&key).chars().collect();
                edit_distance(&chars, &pattern_chars)
            } else {
                edit_distance(&key, pattern)
            };
            nearest.offer(distance, key);
        }
        Ok(())
    };
    let result = scan();
    out.extend(nearest.into_keys());
    result
}

/// Appends keys of `engine` matching `pattern` to `out`.
///
/// At most `capacity` keys are collected, with 0 meaning no limit. Keys found
/// before a failing read stay in `out`.
pub fn search_into(
    engine: &dyn Engine,
    mode: SearchMode,
    pattern: &[u8],
    capacity: usize,
    utf: bool,
    out: &mut Vec<Vec<u8>>,
) -> Result<()> {
    if mode == SearchMode::Edit {
        return edit_search(engine, pattern, capacity, utf, out);
    }
    let matcher = Matcher::build(mode, pattern, utf)?;
    let mut found = 0usize;
    let mut iter = engine.make_iterator();
    iter.first()?;
    while capacity == 0 || found < capacity {
        let Some((key, _)) = iter.step()? else {
            break;
        };
        if matcher.is_match(&key) {
            out.push(key);
            found += 1;
        }
    }
    Ok(())
}

/// Returns the keys of `engine` matching `pattern`.
pub fn search(
    engine: &dyn Engine,
    mode: SearchMode,
    pattern: &[u8],
    capacity: usize,
    utf: bool,
) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    search_into(engine, mode, pattern, capacity, utf, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydbm_core::{DbmType, OpenFlags, OpenParams};
    use polydbm_storage::open_engine;
    use std::path::Path;

    fn tree_with(keys: &[&str]) -> Box<dyn Engine> {
        let flags = OpenFlags {
            writable: true,
            ..Default::default()
        };
        let engine = open_engine(DbmType::StdTree, Path::new(""), &flags, &OpenParams::new()).unwrap();
        for key in keys {
            engine.set(key.as_bytes(), b"", true).unwrap();
        }
        engine
    }

    fn strings(keys: Vec<Vec<u8>>) -> Vec<String> {
        keys.into_iter().map(|k| String::from_utf8(k).unwrap()).collect()
    }

    #[test]
    fn test_mode_names() {
        for mode in ["contain", "begin", "end", "regex", "edit"] {
            assert_eq!(mode.parse::<SearchMode>().unwrap().name(), mode);
        }
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance(b"kitten", b"sitting"), 3);
        assert_eq!(edit_distance(b"", b"abc"), 3);
        assert_eq!(edit_distance(b"same", b"same"), 0);
        let a: Vec<char> = "日本語".chars().collect();
        let b: Vec<char> = "日本".chars().collect();
        assert_eq!(edit_distance(&a, &b), 1);
        assert_eq!(edit_distance("日本語".as_bytes(), "日本".as_bytes()), 3);
    }

    #[test]
    fn test_simple_modes() {
        let engine = tree_with(&["apple", "banana", "grape", "pineapple"]);
        let found = search(engine.as_ref(), SearchMode::Contain, b"apple", 0, false).unwrap();
        assert_eq!(strings(found), ["apple", "pineapple"]);
        let found = search(engine.as_ref(), SearchMode::Begin, b"b", 0, false).unwrap();
        assert_eq!(strings(found), ["banana"]);
        let found = search(engine.as_ref(), SearchMode::End, b"e", 1, false).unwrap();
        assert_eq!(strings(found), ["apple"]);
    }

    #[test]
    fn test_regex_modes() {
        let engine = tree_with(&["a1", "b22", "c333", "日本"]);
        let found = search(engine.as_ref(), SearchMode::Regex, b"^[a-c]\\d{2,}$", 0, false).unwrap();
        assert_eq!(strings(found), ["b22", "c333"]);
        let found = search(engine.as_ref(), SearchMode::Regex, "^.{2}$".as_bytes(), 0, true).unwrap();
        assert_eq!(strings(found), ["a1", "日本"]);
        let err = search(engine.as_ref(), SearchMode::Regex, b"(", 0, false).unwrap_err();
        assert_eq!(err.code(), polydbm_core::StatusCode::InvalidArgument);
    }

    #[test]
    fn test_edit_mode_ranks_by_distance() {
        let engine = tree_with(&["apple", "apply", "maple", "zebra", "appl"]);
        let found = search(engine.as_ref(), SearchMode::Edit, b"apple", 3, false).unwrap();
        // "appl" and "apply" tie at 1; iteration order breaks the tie
        assert_eq!(strings(found), ["apple", "appl", "apply"]);
        let all = search(engine.as_ref(), SearchMode::Edit, b"apple", 0, false).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.last().unwrap(), b"zebra");
    }
}
