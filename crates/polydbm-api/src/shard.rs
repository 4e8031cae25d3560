//! Sharding of one logical database over several engines.
//!
//! Each key belongs to exactly one shard, chosen by `crc32(key) % shards`.
//! Shard files are named `<stem>-<index>-of-<count><ext>` next to the path
//! the database was opened with.

use polydbm_core::engine::{unbound_error, unordered_error};
use polydbm_core::{DbmType, Engine, EngineIterator, Error, OpenFlags, OpenParams, Record, Result};
use polydbm_storage::open_engine;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Path of shard `index` out of `count` for the database at `path`.
///
/// An empty path, as used by purely in-memory databases, stays empty.
pub fn shard_path(path: &Path, index: u32, count: u32) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{}-{:05}-of-{:05}", stem, index, count);
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

/// Parses `NNNNN-of-MMMMM` and returns the shard count.
fn parse_shard_suffix(suffix: &str) -> Option<u32> {
    let (index, count) = suffix.split_once("-of-")?;
    let digits = |s: &str| s.len() == 5 && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(index) || !digits(count) {
        return None;
    }
    let index: u32 = index.parse().ok()?;
    let count: u32 = count.parse().ok()?;
    (index < count).then_some(count)
}

/// Finds existing shard files of `path` and returns the largest shard count
/// named by any of them.
pub fn infer_shard_count(path: &Path) -> Result<Option<u32>> {
    let Some(file_name) = path.file_name() else {
        return Ok(None);
    };
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    debug!(file = %file_name.to_string_lossy(), "Looking for shard files");

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let prefix = format!("{}-", stem);
    let mut found: Option<u32> = None;
    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let suffix = name
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix(ext.as_str()));
        if let Some(count) = suffix.and_then(parse_shard_suffix) {
            found = Some(found.map_or(count, |max| max.max(count)));
        }
    }
    Ok(found)
}

/// An [`Engine`] spreading keys over several engines of the same type.
pub struct ShardRouter {
    path: PathBuf,
    shards: Vec<Box<dyn Engine>>,
}

impl ShardRouter {
    /// Opens `num_shards` engines of `dbm_type`. If any shard fails, those
    /// already opened are closed again before the error is returned.
    pub fn open(
        dbm_type: DbmType,
        path: &Path,
        flags: &OpenFlags,
        params: &OpenParams,
        num_shards: u32,
    ) -> Result<Self> {
        if num_shards == 0 {
            return Err(Error::InvalidArgument("shard count must be positive".to_string()));
        }
        let mut shards: Vec<Box<dyn Engine>> = Vec::with_capacity(num_shards as usize);
        for index in 0..num_shards {
            let shard = shard_path(path, index, num_shards);
            match open_engine(dbm_type, &shard, flags, params) {
                Ok(engine) => shards.push(engine),
                Err(e) => {
                    warn!(shard = %shard.display(), error = %e, "Shard failed to open");
                    for mut opened in shards {
                        if let Err(close_error) = opened.close() {
                            warn!(error = %close_error, "Failed to close shard after open failure");
                        }
                    }
                    return Err(e);
                }
            }
        }
        info!(class = %dbm_type, path = %path.display(), num_shards, "Opened sharded database");
        Ok(Self {
            path: path.to_path_buf(),
            shards,
        })
    }

    /// Number of shards.
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard owning `key`.
    pub fn shard_index(&self, key: &[u8]) -> usize {
        crc32fast::hash(key) as usize % self.shards.len()
    }

    fn shard(&self, key: &[u8]) -> &dyn Engine {
        self.shards[self.shard_index(key)].as_ref()
    }

    /// Runs `op` on every shard in order and returns the first failure.
    fn for_all(&self, op: impl Fn(&dyn Engine) -> Result<()>) -> Result<()> {
        let mut first_error = None;
        for shard in &self.shards {
            if let Err(e) = op(shard.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn sum(&self, op: impl Fn(&dyn Engine) -> Result<u64>) -> Result<u64> {
        self.shards.iter().try_fold(0u64, |total, shard| Ok(total + op(shard.as_ref())?))
    }
}

impl Engine for ShardRouter {
    fn process(&self, key: &[u8], proc: &mut polydbm_core::Processor<'_>, writable: bool) -> Result<()> {
        self.shard(key).process(key, proc, writable)
    }

    fn count(&self) -> Result<u64> {
        self.sum(|shard| shard.count())
    }

    fn file_size(&self) -> Result<u64> {
        self.sum(|shard| shard.file_size())
    }

    fn file_path(&self) -> Result<PathBuf> {
        Ok(self.path.clone())
    }

    fn clear(&self) -> Result<()> {
        self.for_all(|shard| shard.clear())
    }

    fn rebuild(&self, params: &OpenParams) -> Result<()> {
        self.for_all(|shard| shard.rebuild(params))
    }

    fn should_be_rebuilt(&self) -> Result<bool> {
        for shard in &self.shards {
            if shard.should_be_rebuilt()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn synchronize(&self, hard: bool, params: &OpenParams) -> Result<()> {
        self.for_all(|shard| shard.synchronize(hard, params))
    }

    fn is_healthy(&self) -> bool {
        self.shards.iter().all(|shard| shard.is_healthy())
    }

    fn is_ordered(&self) -> bool {
        self.shards[0].is_ordered()
    }

    fn is_writable(&self) -> bool {
        self.shards[0].is_writable()
    }

    fn make_iterator(&self) -> Box<dyn EngineIterator + '_> {
        let iters = self.shards.iter().map(|shard| shard.make_iterator()).collect();
        if self.is_ordered() {
            Box::new(MergingIterator {
                router: self,
                iters,
                position: Position::Unbound,
            })
        } else {
            Box::new(ChainedIterator {
                router: self,
                iters,
                position: Position::Unbound,
            })
        }
    }

    fn copy_file(&self, dest: &Path) -> Result<()> {
        let count = self.shards.len() as u32;
        for (index, shard) in self.shards.iter().enumerate() {
            shard.copy_file(&shard_path(dest, index as u32, count))?;
        }
        Ok(())
    }

    fn inspect(&self) -> Vec<(String, String)> {
        let mut props = Vec::new();
        let mut num_records = 0u64;
        let mut file_size = Some(0u64);
        for (index, shard) in self.shards.iter().enumerate() {
            for (name, value) in shard.inspect() {
                match name.as_str() {
                    "num_records" => num_records += value.parse::<u64>().unwrap_or(0),
                    "file_size" => {
                        file_size = file_size.zip(value.parse::<u64>().ok()).map(|(a, b)| a + b)
                    }
                    _ => {}
                }
                props.push((format!("shard-{:05}.{}", index, name), value));
            }
        }
        let mut head = vec![
            ("class".to_string(), self.dbm_type().name().to_string()),
            ("path".to_string(), self.path.display().to_string()),
            ("num_shards".to_string(), self.shards.len().to_string()),
            ("num_records".to_string(), num_records.to_string()),
            (
                "file_size".to_string(),
                file_size.map_or_else(|| "-1".to_string(), |size| size.to_string()),
            ),
            ("healthy".to_string(), self.is_healthy().to_string()),
        ];
        head.append(&mut props);
        head
    }

    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for shard in &mut self.shards {
            if let Err(e) = shard.close() {
                first_error.get_or_insert(e);
            }
        }
        info!(path = %self.path.display(), "Closed sharded database");
        first_error.map_or(Ok(()), Err)
    }

    fn dbm_type(&self) -> DbmType {
        self.shards[0].dbm_type()
    }

    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.shards[0].compare_keys(a, b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position<T> {
    Unbound,
    At(T),
    Exhausted,
}

/// Iterates ordered shards as one sequence in comparator order.
///
/// Every move asks each shard for its nearest key and keeps the best one,
/// so the position is just a key and survives concurrent changes.
struct MergingIterator<'a> {
    router: &'a ShardRouter,
    iters: Vec<Box<dyn EngineIterator + 'a>>,
    position: Position<Vec<u8>>,
}

impl MergingIterator<'_> {
    /// Positions every shard with `seek`, then settles on the smallest key
    /// (or the largest when `backward`).
    fn settle(
        &mut self,
        backward: bool,
        mut seek: impl FnMut(&mut dyn EngineIterator) -> Result<()>,
    ) -> Result<()> {
        let mut best: Option<Vec<u8>> = None;
        for iter in &mut self.iters {
            seek(iter.as_mut())?;
            let key = match iter.get_key() {
                Ok(key) => key,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    let order = self.router.compare_keys(&key, current);
                    if backward {
                        order == Ordering::Greater
                    } else {
                        order == Ordering::Less
                    }
                }
            };
            if better {
                best = Some(key);
            }
        }
        self.position = best.map_or(Position::Exhausted, Position::At);
        Ok(())
    }

    fn current_key(&self) -> Result<Vec<u8>> {
        match &self.position {
            Position::Unbound => Err(unbound_error()),
            Position::At(key) => Ok(key.clone()),
            Position::Exhausted => Err(Error::NotFound("iterator is at the end".to_string())),
        }
    }
}

impl EngineIterator for MergingIterator<'_> {
    fn first(&mut self) -> Result<()> {
        self.settle(false, |iter| iter.first())
    }

    fn last(&mut self) -> Result<()> {
        self.settle(true, |iter| iter.last())
    }

    fn jump(&mut self, key: &[u8]) -> Result<()> {
        self.settle(false, |iter| iter.jump(key))
    }

    fn jump_lower(&mut self, key: &[u8], inclusive: bool) -> Result<()> {
        self.settle(true, |iter| iter.jump_lower(key, inclusive))
    }

    fn jump_upper(&mut self, key: &[u8], inclusive: bool) -> Result<()> {
        self.settle(false, |iter| iter.jump_upper(key, inclusive))
    }

    fn next(&mut self) -> Result<()> {
        match &self.position {
            Position::Unbound => Err(unbound_error()),
            Position::Exhausted => Ok(()),
            Position::At(key) => {
                let key = key.clone();
                self.settle(false, |iter| iter.jump_upper(&key, false))
            }
        }
    }

    fn previous(&mut self) -> Result<()> {
        match &self.position {
            Position::Unbound => Err(unbound_error()),
            Position::Exhausted => Ok(()),
            Position::At(key) => {
                let key = key.clone();
                self.settle(true, |iter| iter.jump_lower(&key, false))
            }
        }
    }

    fn get(&mut self) -> Result<Record> {
        loop {
            let key = match &self.position {
                Position::At(key) => key.clone(),
                _ => return Err(Error::NotFound("iterator is not at a record".to_string())),
            };
            match self.router.get(&key) {
                Ok(value) => return Ok((key, value)),
                // removed since we got here
                Err(e) if e.is_not_found() => self.next()?,
                Err(e) => return Err(e),
            }
        }
    }

    fn set(&mut self, value: &[u8]) -> Result<()> {
        self.current_key()?;
        let (key, _) = self.get()?;
        self.router.set(&key, value, true)?;
        self.next()
    }

    fn remove(&mut self) -> Result<()> {
        self.current_key()?;
        let (key, _) = self.get()?;
        self.router.remove(&key)?;
        self.next()
    }
}

/// Iterates unordered shards one after another.
struct ChainedIterator<'a> {
    router: &'a ShardRouter,
    iters: Vec<Box<dyn EngineIterator + 'a>>,
    position: Position<usize>,
}

impl ChainedIterator<'_> {
    /// Moves past exhausted shards until one has a record.
    fn settle(&mut self) -> Result<()> {
        while let Position::At(index) = self.position {
            match self.iters[index].get_key() {
                Ok(_) => return Ok(()),
                Err(e) if e.is_not_found() => {
                    if index + 1 < self.iters.len() {
                        self.iters[index + 1].first()?;
                        self.position = Position::At(index + 1);
                    } else {
                        self.position = Position::Exhausted;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn current(&self) -> Result<usize> {
        match self.position {
            Position::Unbound => Err(unbound_error()),
            Position::At(index) => Ok(index),
            Position::Exhausted => Err(Error::NotFound("iterator is at the end".to_string())),
        }
    }
}

impl EngineIterator for ChainedIterator<'_> {
    fn first(&mut self) -> Result<()> {
        self.iters[0].first()?;
        self.position = Position::At(0);
        self.settle()
    }

    fn last(&mut self) -> Result<()> {
        Err(unordered_error("last"))
    }

    fn jump(&mut self, key: &[u8]) -> Result<()> {
        // continues from the owning shard, later shards follow
        let owner = self.router.shard_index(key);
        self.iters[owner].jump(key)?;
        self.position = Position::At(owner);
        self.settle()
    }

    fn jump_lower(&mut self, _key: &[u8], _inclusive: bool) -> Result<()> {
        Err(unordered_error("jump_lower"))
    }

    fn jump_upper(&mut self, _key: &[u8], _inclusive: bool) -> Result<()> {
        Err(unordered_error("jump_upper"))
    }

    fn next(&mut self) -> Result<()> {
        match self.position {
            Position::Unbound => Err(unbound_error()),
            Position::Exhausted => Ok(()),
            Position::At(index) => {
                self.iters[index].next()?;
                self.settle()
            }
        }
    }

    fn previous(&mut self) -> Result<()> {
        Err(unordered_error("previous"))
    }

    fn get(&mut self) -> Result<Record> {
        loop {
            let index = match self.position {
                Position::At(index) => index,
                _ => return Err(Error::NotFound("iterator is not at a record".to_string())),
            };
            match self.iters[index].get() {
                Ok(record) => return Ok(record),
                Err(e) if e.is_not_found() => self.settle()?,
                Err(e) => return Err(e),
            }
        }
    }

    fn set(&mut self, value: &[u8]) -> Result<()> {
        let index = self.current()?;
        self.iters[index].set(value)?;
        self.settle()
    }

    fn remove(&mut self) -> Result<()> {
        let index = self.current()?;
        self.iters[index].remove()?;
        self.settle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn writable() -> OpenFlags {
        OpenFlags {
            writable: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_shard_path_format() {
        assert_eq!(
            shard_path(Path::new("/data/casket.tkh"), 3, 16),
            PathBuf::from("/data/casket-00003-of-00016.tkh")
        );
        assert_eq!(
            shard_path(Path::new("casket"), 0, 2),
            PathBuf::from("casket-00000-of-00002")
        );
        assert_eq!(shard_path(Path::new(""), 1, 4), PathBuf::new());
    }

    #[test]
    fn test_parse_shard_suffix() {
        assert_eq!(parse_shard_suffix("00001-of-00004"), Some(4));
        assert_eq!(parse_shard_suffix("00004-of-00004"), None);
        assert_eq!(parse_shard_suffix("1-of-4"), None);
        assert_eq!(parse_shard_suffix("00001-00004"), None);
    }

    #[test]
    fn test_infer_shard_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("casket.tkh");
        assert_eq!(infer_shard_count(&path).unwrap(), None);
        for index in 0..3 {
            std::fs::write(shard_path(&path, index, 3), b"").unwrap();
        }
        std::fs::write(dir.path().join("other-00000-of-00009.tkh"), b"").unwrap();
        std::fs::write(dir.path().join("casket-00000-of-00009.tkt"), b"").unwrap();
        assert_eq!(infer_shard_count(&path).unwrap(), Some(3));
    }

    #[test]
    fn test_keys_spread_over_shards() {
        let router = ShardRouter::open(DbmType::StdHash, Path::new(""), &writable(), &OpenParams::new(), 4)
            .unwrap();
        for i in 0..200 {
            router.set(format!("key{}", i).as_bytes(), b"v", true).unwrap();
        }
        assert_eq!(router.count().unwrap(), 200);
        for shard in &router.shards {
            assert!(shard.count().unwrap() > 0);
        }
        let props = router.inspect();
        assert!(props.contains(&("num_shards".to_string(), "4".to_string())));
        assert!(props.contains(&("num_records".to_string(), "200".to_string())));
        assert!(props.iter().any(|(name, _)| name == "shard-00003.num_records"));
    }

    #[test]
    fn test_merging_iterator_orders_across_shards() {
        let router = ShardRouter::open(DbmType::StdTree, Path::new(""), &writable(), &OpenParams::new(), 3)
            .unwrap();
        for i in (0..30).rev() {
            router.set(format!("{:03}", i).as_bytes(), b"v", true).unwrap();
        }
        let mut iter = router.make_iterator();
        iter.first().unwrap();
        let mut keys = Vec::new();
        while let Some((key, _)) = iter.step().unwrap() {
            keys.push(String::from_utf8(key).unwrap());
        }
        let expected: Vec<String> = (0..30).map(|i| format!("{:03}", i)).collect();
        assert_eq!(keys, expected);

        iter.last().unwrap();
        assert_eq!(iter.get_key().unwrap(), b"029");
        iter.previous().unwrap();
        assert_eq!(iter.get_key().unwrap(), b"028");
        iter.jump_lower(b"010", false).unwrap();
        assert_eq!(iter.get_key().unwrap(), b"009");
    }

    #[test]
    fn test_chained_iterator_visits_each_key_once() {
        let router = ShardRouter::open(DbmType::Tiny, Path::new(""), &writable(), &OpenParams::new(), 5)
            .unwrap();
        for i in 0..100 {
            router.set(format!("k{}", i).as_bytes(), b"v", true).unwrap();
        }
        let mut iter = router.make_iterator();
        assert!(iter.last().is_err());
        iter.first().unwrap();
        let mut seen = std::collections::HashSet::new();
        while let Some((key, _)) = iter.step().unwrap() {
            assert!(seen.insert(key));
        }
        assert_eq!(seen.len(), 100);

        iter.jump(b"k42").unwrap();
        assert_eq!(iter.get_key().unwrap(), b"k42");
        iter.remove().unwrap();
        assert_eq!(router.count().unwrap(), 99);
    }

    #[test]
    fn test_failed_shard_closes_opened_ones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("casket.tkh");
        // a directory where the third shard file should go
        std::fs::create_dir(shard_path(&path, 2, 3)).unwrap();
        assert!(ShardRouter::open(DbmType::Hash, &path, &writable(), &OpenParams::new(), 3).is_err());

        // the first two shards were unlocked again
        let no_wait = OpenFlags {
            writable: true,
            no_wait: true,
            ..Default::default()
        };
        let mut shard = open_engine(DbmType::Hash, &shard_path(&path, 0, 3), &no_wait, &OpenParams::new())
            .unwrap();
        shard.close().unwrap();
    }
}
