//! Advisory hash cache keyed by file path and modification time.
//!
//! A cached entry is only honoured when its modification time equals the
//! file's current one and it was produced by the same algorithm and, for
//! partial digests, the same window. Anything else is a miss; the cache
//! never affects which results are reported.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ddff_core::ContentHash;

use crate::error::CacheError;
use crate::hasher::HashAlgorithm;

/// Which of the two per-file digests an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    /// Head and tail window digest.
    Partial,
    /// Whole-content digest.
    Full,
}

/// One remembered digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHash {
    /// Modification time of the file when the digest was taken.
    pub modified: SystemTime,
    /// Algorithm that produced `hash`.
    pub algorithm: HashAlgorithm,
    /// Head and tail window size, for partial digests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,
    pub hash: ContentHash,
}

impl CachedHash {
    /// Whether this entry may stand in for a fresh digest.
    pub fn is_valid_for(
        &self,
        modified: SystemTime,
        algorithm: HashAlgorithm,
        window: Option<usize>,
    ) -> bool {
        self.modified == modified && self.algorithm == algorithm && self.window == window
    }
}

/// Storage for per-file digests. Implementations must tolerate concurrent
/// use from the hashing thread pool.
pub trait HashCache: Send + Sync {
    fn get(&self, path: &Path, kind: HashKind) -> Option<CachedHash>;

    fn put(&self, path: &Path, kind: HashKind, entry: CachedHash);
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryHashCache {
    entries: DashMap<(PathBuf, HashKind), CachedHash>,
}

impl MemoryHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HashCache for MemoryHashCache {
    fn get(&self, path: &Path, kind: HashKind) -> Option<CachedHash> {
        self.entries
            .get(&(path.to_path_buf(), kind))
            .map(|e| e.value().clone())
    }

    fn put(&self, path: &Path, kind: HashKind, entry: CachedHash) {
        self.entries.insert((path.to_path_buf(), kind), entry);
    }
}

/// On-disk record layout.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    path: PathBuf,
    kind: HashKind,
    #[serde(flatten)]
    entry: CachedHash,
}

/// Cache persisted as a JSON file between runs.
#[derive(Debug)]
pub struct JsonHashCache {
    path: PathBuf,
    memory: MemoryHashCache,
    dirty: AtomicBool,
}

impl JsonHashCache {
    /// Load the cache at `path`. A missing file yields an empty cache, and
    /// so does an unreadable or corrupt one (with a warning).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let memory = MemoryHashCache::new();

        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<CacheRecord>>(&bytes) {
                Ok(records) => {
                    for record in records {
                        memory.put(&record.path, record.kind, record.entry);
                    }
                    debug!(path = %path.display(), entries = memory.len(), "loaded hash cache");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring corrupt hash cache");
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read hash cache");
            }
        }

        Self {
            path,
            memory,
            dirty: AtomicBool::new(false),
        }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Write the cache back if anything changed. The file is replaced
    /// atomically through a sibling temporary file.
    pub fn save(&self) -> Result<(), CacheError> {
        if !self.dirty.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut records: Vec<CacheRecord> = self
            .memory
            .entries
            .iter()
            .map(|e| CacheRecord {
                path: e.key().0.clone(),
                kind: e.key().1,
                entry: e.value().clone(),
            })
            .collect();
        records.sort_by(|a, b| (&a.path, a.kind).cmp(&(&b.path, b.kind)));

        let json = serde_json::to_vec(&records)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CacheError::io(&self.path, e))?;

        self.dirty.store(false, Ordering::Relaxed);
        debug!(path = %self.path.display(), entries = records.len(), "saved hash cache");
        Ok(())
    }
}

impl HashCache for JsonHashCache {
    fn get(&self, path: &Path, kind: HashKind) -> Option<CachedHash> {
        self.memory.get(path, kind)
    }

    fn put(&self, path: &Path, kind: HashKind, entry: CachedHash) {
        self.memory.put(path, kind, entry);
        self.dirty.store(true, Ordering::Relaxed);
    }
}
