//! Open parameters, backend types and per-backend tuning.
//!
//! Parameters arrive as a string map. The generic keys are split off into
//! [`OpenFlags`] and the sharding/type selection fields; everything else must
//! belong to the tuning structure of the selected backend, or open fails.

use crate::comparator::KeyComparator;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The concrete storage strategy behind a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbmType {
    /// Persistent hash file
    Hash,
    /// Persistent ordered tree file
    Tree,
    /// Sorted skip file with batched updates
    Skip,
    /// In-memory hash map with striped buckets
    Tiny,
    /// In-memory ordered map with a configurable comparator
    Baby,
    /// Bounded in-memory LRU cache
    Cache,
    /// Plain in-memory hash map
    StdHash,
    /// Plain in-memory ordered map
    StdTree,
}

impl DbmType {
    /// All backend types.
    pub const ALL: [DbmType; 8] = [
        DbmType::Hash,
        DbmType::Tree,
        DbmType::Skip,
        DbmType::Tiny,
        DbmType::Baby,
        DbmType::Cache,
        DbmType::StdHash,
        DbmType::StdTree,
    ];

    /// Returns the class name used by the `dbm` parameter.
    pub fn name(&self) -> &'static str {
        match self {
            DbmType::Hash => "HashDBM",
            DbmType::Tree => "TreeDBM",
            DbmType::Skip => "SkipDBM",
            DbmType::Tiny => "TinyDBM",
            DbmType::Baby => "BabyDBM",
            DbmType::Cache => "CacheDBM",
            DbmType::StdHash => "StdHashDBM",
            DbmType::StdTree => "StdTreeDBM",
        }
    }

    /// Returns the file extension (without the dot) associated with the type.
    pub fn extension(&self) -> &'static str {
        match self {
            DbmType::Hash => "tkh",
            DbmType::Tree => "tkt",
            DbmType::Skip => "tks",
            DbmType::Tiny => "tkmt",
            DbmType::Baby => "tkmb",
            DbmType::Cache => "tkmc",
            DbmType::StdHash => "tksh",
            DbmType::StdTree => "tkst",
        }
    }

    /// Infers the type from the extension of a path.
    pub fn from_path(path: &Path) -> Option<DbmType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        DbmType::ALL.into_iter().find(|t| t.extension() == ext)
    }

    /// Whether the iterator of this type follows a key order.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            DbmType::Tree | DbmType::Skip | DbmType::Baby | DbmType::StdTree
        )
    }

    /// Whether records live in a file rather than memory.
    pub fn is_file_based(&self) -> bool {
        matches!(self, DbmType::Hash | DbmType::Tree | DbmType::Skip)
    }
}

impl fmt::Display for DbmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbmType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DbmType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown database type: {}", s)))
    }
}

/// String-keyed parameter map passed to open, rebuild and synchronize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenParams {
    entries: BTreeMap<String, String>,
}

impl OpenParams {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the value of a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Removes a parameter and returns its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fails with `InvalidArgument` naming the first key outside `allowed`.
    pub fn check_keys(&self, allowed: &[&str], context: &str) -> Result<()> {
        match self.entries.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(Error::InvalidArgument(format!(
                "unknown parameter for {}: {}",
                context, key
            ))),
            None => Ok(()),
        }
    }

    /// Parses a boolean parameter.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|v| parse_bool(key, v)).transpose()
    }

    /// Parses an integer parameter.
    pub fn get_int<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|v| {
                v.trim().parse::<T>().map_err(|_| {
                    Error::InvalidArgument(format!("invalid integer for {}: {}", key, v))
                })
            })
            .transpose()
    }

    /// Parses a parameter with its `FromStr` implementation.
    pub fn get_parsed<T: FromStr<Err = Error>>(&self, key: &str) -> Result<Option<T>> {
        self.get(key).map(str::parse).transpose()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OpenParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = OpenParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::InvalidArgument(format!(
            "invalid boolean for {}: {}",
            key, value
        ))),
    }
}

fn check_range<T: PartialOrd + fmt::Display + Copy>(
    key: &str,
    value: Option<T>,
    min: T,
    max: T,
) -> Result<Option<T>> {
    match value {
        Some(v) if v < min || v > max => Err(Error::InvalidArgument(format!(
            "{} out of range [{}, {}]: {}",
            key, min, max, v
        ))),
        other => Ok(other),
    }
}

/// Generic flags applied uniformly to every engine (and every shard) at open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for writing
    pub writable: bool,
    /// Discard existing content
    pub truncate: bool,
    /// Fail instead of creating a missing file
    pub no_create: bool,
    /// Fail immediately if the file is locked
    pub no_wait: bool,
    /// Skip file locking entirely
    pub no_lock: bool,
}

/// Generic parameter keys recognized by every backend.
pub const GENERIC_KEYS: &[&str] = &["truncate", "no_create", "no_wait", "no_lock", "num_shards", "dbm"];

/// Result of splitting the generic keys off an open parameter map.
#[derive(Debug, Clone, Default)]
pub struct GenericParams {
    /// Open flags
    pub flags: OpenFlags,
    /// Requested shard count (`Some(0)` means infer from existing files)
    pub num_shards: Option<u32>,
    /// Explicitly requested backend
    pub dbm: Option<DbmType>,
    /// Remaining backend-specific parameters
    pub tuning: OpenParams,
}

impl GenericParams {
    /// Splits `params` into generic settings and backend tuning.
    pub fn split(params: &OpenParams, writable: bool) -> Result<Self> {
        let flags = OpenFlags {
            writable,
            truncate: params.get_bool("truncate")?.unwrap_or(false),
            no_create: params.get_bool("no_create")?.unwrap_or(false),
            no_wait: params.get_bool("no_wait")?.unwrap_or(false),
            no_lock: params.get_bool("no_lock")?.unwrap_or(false),
        };
        let num_shards = params.get_int::<u32>("num_shards")?;
        let dbm = params.get_parsed::<DbmType>("dbm")?;
        let tuning = params
            .iter()
            .filter(|(k, _)| !GENERIC_KEYS.contains(k))
            .collect();
        Ok(Self {
            flags,
            num_shards,
            dbm,
            tuning,
        })
    }
}

/// How the hash and tree files record updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Update records in place
    InPlace,
    /// Append every update
    Appending,
}

impl UpdateMode {
    /// Returns the parameter spelling.
    pub fn name(&self) -> &'static str {
        match self {
            UpdateMode::InPlace => "UPDATE_IN_PLACE",
            UpdateMode::Appending => "UPDATE_APPENDING",
        }
    }
}

impl FromStr for UpdateMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UPDATE_IN_PLACE" => Ok(UpdateMode::InPlace),
            "UPDATE_APPENDING" => Ok(UpdateMode::Appending),
            _ => Err(Error::InvalidArgument(format!("unknown update mode: {}", s))),
        }
    }
}

/// Overwrites `dst` with `src` for every field `src` sets.
macro_rules! merge_fields {
    ($dst:expr, $src:expr, $($field:ident),+) => {
        $( if $src.$field.is_some() { $dst.$field = $src.$field; } )+
    };
}

/// Emits `key=value` for every field that is set.
macro_rules! push_fields {
    ($params:expr, $src:expr, $($field:ident),+) => {
        $( if let Some(v) = &$src.$field { $params.insert(stringify!($field), v.to_string()); } )+
    };
}

/// Tuning of the persistent hash file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashTuning {
    /// Update strategy
    pub update_mode: Option<UpdateMode>,
    /// Width of record offsets in bytes
    pub offset_width: Option<u32>,
    /// Power of two records are aligned to
    pub align_pow: Option<u32>,
    /// Number of hash buckets
    pub num_buckets: Option<u64>,
    /// Capacity of the free block pool
    pub fbp_capacity: Option<u64>,
    /// Lock the bucket array in memory
    pub lock_mem_buckets: Option<bool>,
}

impl HashTuning {
    /// Recognized parameter keys.
    pub const KEYS: &'static [&'static str] = &[
        "update_mode",
        "offset_width",
        "align_pow",
        "num_buckets",
        "fbp_capacity",
        "lock_mem_buckets",
    ];
    /// Default number of buckets.
    pub const DEFAULT_NUM_BUCKETS: u64 = 1_048_583;

    /// Parses the hash keys of `params`, ignoring other keys.
    fn parse_fields(params: &OpenParams) -> Result<Self> {
        Ok(Self {
            update_mode: params.get_parsed("update_mode")?,
            offset_width: check_range("offset_width", params.get_int("offset_width")?, 3, 6)?,
            align_pow: check_range("align_pow", params.get_int("align_pow")?, 0, 16)?,
            num_buckets: check_range("num_buckets", params.get_int("num_buckets")?, 1, u64::MAX)?,
            fbp_capacity: params.get_int("fbp_capacity")?,
            lock_mem_buckets: params.get_bool("lock_mem_buckets")?,
        })
    }

    /// Parses and validates hash tuning.
    pub fn parse(params: &OpenParams) -> Result<Self> {
        params.check_keys(Self::KEYS, DbmType::Hash.name())?;
        Self::parse_fields(params)
    }

    /// Applies every field set in `other`.
    pub fn merge(&mut self, other: &Self) {
        merge_fields!(self, other, update_mode, offset_width, align_pow, num_buckets, fbp_capacity, lock_mem_buckets);
    }

    /// Fills unset fields with defaults.
    pub fn resolved(&self) -> Self {
        Self {
            update_mode: Some(self.update_mode.unwrap_or(UpdateMode::InPlace)),
            offset_width: Some(self.offset_width.unwrap_or(4)),
            align_pow: Some(self.align_pow.unwrap_or(3)),
            num_buckets: Some(self.num_buckets.unwrap_or(Self::DEFAULT_NUM_BUCKETS)),
            fbp_capacity: Some(self.fbp_capacity.unwrap_or(64)),
            lock_mem_buckets: Some(self.lock_mem_buckets.unwrap_or(false)),
        }
    }

    fn push_params(&self, params: &mut OpenParams) {
        if let Some(mode) = self.update_mode {
            params.insert("update_mode", mode.name());
        }
        push_fields!(params, self, offset_width, align_pow, num_buckets, fbp_capacity, lock_mem_buckets);
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        let mut params = OpenParams::new();
        self.push_params(&mut params);
        params
    }
}

/// Tuning of the persistent tree file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeTuning {
    /// Settings shared with the hash file
    pub hash: HashTuning,
    /// Maximum size of a page
    pub max_page_size: Option<u64>,
    /// Maximum branches of an inner node
    pub max_branches: Option<u64>,
    /// Maximum number of cached pages
    pub max_cached_pages: Option<u64>,
    /// Key order
    pub key_comparator: Option<KeyComparator>,
}

impl TreeTuning {
    /// Recognized parameter keys beyond the hash ones.
    pub const KEYS: &'static [&'static str] =
        &["max_page_size", "max_branches", "max_cached_pages", "key_comparator"];

    /// Parses and validates tree tuning.
    pub fn parse(params: &OpenParams) -> Result<Self> {
        let allowed: Vec<&str> = HashTuning::KEYS.iter().chain(Self::KEYS).copied().collect();
        params.check_keys(&allowed, DbmType::Tree.name())?;
        Ok(Self {
            hash: HashTuning::parse_fields(params)?,
            max_page_size: check_range("max_page_size", params.get_int("max_page_size")?, 1, u64::MAX)?,
            max_branches: check_range("max_branches", params.get_int("max_branches")?, 2, u64::MAX)?,
            max_cached_pages: params.get_int("max_cached_pages")?,
            key_comparator: params.get_parsed("key_comparator")?,
        })
    }

    /// Applies every field set in `other`.
    pub fn merge(&mut self, other: &Self) {
        self.hash.merge(&other.hash);
        merge_fields!(self, other, max_page_size, max_branches, max_cached_pages, key_comparator);
    }

    /// Fills unset fields with defaults.
    pub fn resolved(&self) -> Self {
        Self {
            hash: self.hash.resolved(),
            max_page_size: Some(self.max_page_size.unwrap_or(8130)),
            max_branches: Some(self.max_branches.unwrap_or(256)),
            max_cached_pages: Some(self.max_cached_pages.unwrap_or(10_000)),
            key_comparator: Some(self.key_comparator.unwrap_or_default()),
        }
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        let mut params = OpenParams::new();
        self.hash.push_params(&mut params);
        push_fields!(params, self, max_page_size, max_branches, max_cached_pages, key_comparator);
        params
    }
}

/// Tuning of the skip file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkipTuning {
    /// Width of record offsets in bytes
    pub offset_width: Option<u32>,
    /// Step unit of the skip structure
    pub step_unit: Option<u32>,
    /// Maximum level of the skip structure
    pub max_level: Option<u32>,
    /// Bytes of pending updates held before a rebuild is advised
    pub sort_mem_size: Option<u64>,
    /// Records are expected in ascending key order
    pub insert_in_order: Option<bool>,
    /// Maximum number of records kept in the block cache
    pub max_cached_records: Option<u64>,
}

impl SkipTuning {
    /// Recognized parameter keys.
    pub const KEYS: &'static [&'static str] = &[
        "offset_width",
        "step_unit",
        "max_level",
        "sort_mem_size",
        "insert_in_order",
        "max_cached_records",
    ];

    /// Parses and validates skip tuning.
    pub fn parse(params: &OpenParams) -> Result<Self> {
        params.check_keys(Self::KEYS, DbmType::Skip.name())?;
        Ok(Self {
            offset_width: check_range("offset_width", params.get_int("offset_width")?, 3, 6)?,
            step_unit: check_range("step_unit", params.get_int("step_unit")?, 2, 1024)?,
            max_level: check_range("max_level", params.get_int("max_level")?, 1, 32)?,
            sort_mem_size: params.get_int("sort_mem_size")?,
            insert_in_order: params.get_bool("insert_in_order")?,
            max_cached_records: params.get_int("max_cached_records")?,
        })
    }

    /// Applies every field set in `other`.
    pub fn merge(&mut self, other: &Self) {
        merge_fields!(self, other, offset_width, step_unit, max_level, sort_mem_size, insert_in_order, max_cached_records);
    }

    /// Fills unset fields with defaults.
    pub fn resolved(&self) -> Self {
        Self {
            offset_width: Some(self.offset_width.unwrap_or(4)),
            step_unit: Some(self.step_unit.unwrap_or(4)),
            max_level: Some(self.max_level.unwrap_or(14)),
            sort_mem_size: Some(self.sort_mem_size.unwrap_or(256 * 1024 * 1024)),
            insert_in_order: Some(self.insert_in_order.unwrap_or(false)),
            max_cached_records: Some(self.max_cached_records.unwrap_or(65_536)),
        }
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        let mut params = OpenParams::new();
        push_fields!(params, self, offset_width, step_unit, max_level, sort_mem_size, insert_in_order, max_cached_records);
        params
    }
}

/// Tuning of the striped in-memory hash map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TinyTuning {
    /// Number of hash buckets
    pub num_buckets: Option<u64>,
}

impl TinyTuning {
    /// Recognized parameter keys.
    pub const KEYS: &'static [&'static str] = &["num_buckets"];

    /// Parses and validates tiny tuning.
    pub fn parse(params: &OpenParams) -> Result<Self> {
        params.check_keys(Self::KEYS, DbmType::Tiny.name())?;
        Ok(Self {
            num_buckets: check_range("num_buckets", params.get_int("num_buckets")?, 1, u64::MAX)?,
        })
    }

    /// Applies every field set in `other`.
    pub fn merge(&mut self, other: &Self) {
        merge_fields!(self, other, num_buckets);
    }

    /// Fills unset fields with defaults.
    pub fn resolved(&self) -> Self {
        Self {
            num_buckets: Some(self.num_buckets.unwrap_or(HashTuning::DEFAULT_NUM_BUCKETS)),
        }
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        let mut params = OpenParams::new();
        push_fields!(params, self, num_buckets);
        params
    }
}

/// Tuning of the in-memory ordered map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BabyTuning {
    /// Key order
    pub key_comparator: Option<KeyComparator>,
}

impl BabyTuning {
    /// Recognized parameter keys.
    pub const KEYS: &'static [&'static str] = &["key_comparator"];

    /// Parses and validates baby tuning.
    pub fn parse(params: &OpenParams) -> Result<Self> {
        params.check_keys(Self::KEYS, DbmType::Baby.name())?;
        Ok(Self {
            key_comparator: params.get_parsed("key_comparator")?,
        })
    }

    /// Applies every field set in `other`.
    pub fn merge(&mut self, other: &Self) {
        merge_fields!(self, other, key_comparator);
    }

    /// Fills unset fields with defaults.
    pub fn resolved(&self) -> Self {
        Self {
            key_comparator: Some(self.key_comparator.unwrap_or_default()),
        }
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        let mut params = OpenParams::new();
        push_fields!(params, self, key_comparator);
        params
    }
}

/// Tuning of the LRU cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheTuning {
    /// Maximum number of records
    pub cap_rec_num: Option<u64>,
    /// Maximum total bytes of keys and values
    pub cap_mem_size: Option<u64>,
}

impl CacheTuning {
    /// Recognized parameter keys.
    pub const KEYS: &'static [&'static str] = &["cap_rec_num", "cap_mem_size"];
    /// Default record capacity.
    pub const DEFAULT_CAP_REC_NUM: u64 = 1_048_576;

    /// Parses and validates cache tuning.
    pub fn parse(params: &OpenParams) -> Result<Self> {
        params.check_keys(Self::KEYS, DbmType::Cache.name())?;
        Ok(Self {
            cap_rec_num: check_range("cap_rec_num", params.get_int("cap_rec_num")?, 1, u64::MAX)?,
            cap_mem_size: params.get_int("cap_mem_size")?,
        })
    }

    /// Applies every field set in `other`.
    pub fn merge(&mut self, other: &Self) {
        merge_fields!(self, other, cap_rec_num, cap_mem_size);
    }

    /// Fills unset fields with defaults; an unset memory cap stays unlimited.
    pub fn resolved(&self) -> Self {
        Self {
            cap_rec_num: Some(self.cap_rec_num.unwrap_or(Self::DEFAULT_CAP_REC_NUM)),
            cap_mem_size: self.cap_mem_size,
        }
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        let mut params = OpenParams::new();
        push_fields!(params, self, cap_rec_num, cap_mem_size);
        params
    }
}

/// Backend-specific tuning, one variant per [`DbmType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Tuning {
    /// Hash file tuning
    Hash(HashTuning),
    /// Tree file tuning
    Tree(TreeTuning),
    /// Skip file tuning
    Skip(SkipTuning),
    /// Tiny map tuning
    Tiny(TinyTuning),
    /// Baby map tuning
    Baby(BabyTuning),
    /// Cache tuning
    Cache(CacheTuning),
    /// The std hash map takes no tuning
    StdHash,
    /// The std tree map takes no tuning
    StdTree,
}

impl Tuning {
    /// Parses `params` for `dbm_type`, rejecting keys that backend does not know.
    pub fn parse(dbm_type: DbmType, params: &OpenParams) -> Result<Self> {
        Ok(match dbm_type {
            DbmType::Hash => Tuning::Hash(HashTuning::parse(params)?),
            DbmType::Tree => Tuning::Tree(TreeTuning::parse(params)?),
            DbmType::Skip => Tuning::Skip(SkipTuning::parse(params)?),
            DbmType::Tiny => Tuning::Tiny(TinyTuning::parse(params)?),
            DbmType::Baby => Tuning::Baby(BabyTuning::parse(params)?),
            DbmType::Cache => Tuning::Cache(CacheTuning::parse(params)?),
            DbmType::StdHash => {
                params.check_keys(&[], DbmType::StdHash.name())?;
                Tuning::StdHash
            }
            DbmType::StdTree => {
                params.check_keys(&[], DbmType::StdTree.name())?;
                Tuning::StdTree
            }
        })
    }

    /// Returns the backend type the tuning belongs to.
    pub fn dbm_type(&self) -> DbmType {
        match self {
            Tuning::Hash(_) => DbmType::Hash,
            Tuning::Tree(_) => DbmType::Tree,
            Tuning::Skip(_) => DbmType::Skip,
            Tuning::Tiny(_) => DbmType::Tiny,
            Tuning::Baby(_) => DbmType::Baby,
            Tuning::Cache(_) => DbmType::Cache,
            Tuning::StdHash => DbmType::StdHash,
            Tuning::StdTree => DbmType::StdTree,
        }
    }

    /// Applies every field set in `other`; mismatched variants are rejected.
    pub fn merge(&mut self, other: &Tuning) -> Result<()> {
        match (self, other) {
            (Tuning::Hash(a), Tuning::Hash(b)) => a.merge(b),
            (Tuning::Tree(a), Tuning::Tree(b)) => a.merge(b),
            (Tuning::Skip(a), Tuning::Skip(b)) => a.merge(b),
            (Tuning::Tiny(a), Tuning::Tiny(b)) => a.merge(b),
            (Tuning::Baby(a), Tuning::Baby(b)) => a.merge(b),
            (Tuning::Cache(a), Tuning::Cache(b)) => a.merge(b),
            (Tuning::StdHash, Tuning::StdHash) | (Tuning::StdTree, Tuning::StdTree) => {}
            (a, b) => {
                return Err(Error::InvalidArgument(format!(
                    "tuning mismatch: {} vs {}",
                    a.dbm_type(),
                    b.dbm_type()
                )))
            }
        }
        Ok(())
    }

    /// Fills unset fields with defaults.
    pub fn resolved(&self) -> Self {
        match self {
            Tuning::Hash(t) => Tuning::Hash(t.resolved()),
            Tuning::Tree(t) => Tuning::Tree(t.resolved()),
            Tuning::Skip(t) => Tuning::Skip(t.resolved()),
            Tuning::Tiny(t) => Tuning::Tiny(t.resolved()),
            Tuning::Baby(t) => Tuning::Baby(t.resolved()),
            Tuning::Cache(t) => Tuning::Cache(t.resolved()),
            Tuning::StdHash => Tuning::StdHash,
            Tuning::StdTree => Tuning::StdTree,
        }
    }

    /// Serializes the set fields back into parameters.
    pub fn to_params(&self) -> OpenParams {
        match self {
            Tuning::Hash(t) => t.to_params(),
            Tuning::Tree(t) => t.to_params(),
            Tuning::Skip(t) => t.to_params(),
            Tuning::Tiny(t) => t.to_params(),
            Tuning::Baby(t) => t.to_params(),
            Tuning::Cache(t) => t.to_params(),
            Tuning::StdHash | Tuning::StdTree => OpenParams::new(),
        }
    }
}
