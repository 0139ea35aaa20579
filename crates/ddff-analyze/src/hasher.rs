//! Content digests for files and hash combination for directories.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use tracing::trace;

use ddff_core::{ContentHash, HashError};

use crate::cache::{CachedHash, HashCache, HashKind};

/// Read buffer for whole-file hashing.
const FULL_HASH_BUFFER: usize = 1024 * 1024;

/// Default size of each of the head and tail windows of a partial hash.
pub const DEFAULT_PARTIAL_WINDOW: usize = 512;

/// Digest algorithm used for every hash of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha512" | "sha-512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{other}' (expected sha512 or blake3)")),
        }
    }
}

/// Streaming digest state for either algorithm.
enum StreamingDigest {
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingDigest {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha512 => StreamingDigest::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Blake3 => StreamingDigest::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamingDigest::Sha512(h) => h.update(bytes),
            StreamingDigest::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finalize(self) -> ContentHash {
        match self {
            StreamingDigest::Sha512(h) => ContentHash::from_digest(&h.finalize()),
            StreamingDigest::Blake3(h) => ContentHash::from_digest(h.finalize().as_bytes()),
        }
    }
}

/// The hashing capability the elimination pipeline depends on.
///
/// All paths are fully qualified. Implementations are shared with the
/// hashing thread pool and must be `Send + Sync`.
pub trait Hasher: Send + Sync {
    /// Digest of the whole file content.
    fn digest_file_full(&self, path: &Path) -> Result<ContentHash, HashError>;

    /// Digest of the head and tail windows of the file, or of the whole
    /// content when the file fits in one window.
    fn digest_file_partial(&self, path: &Path) -> Result<ContentHash, HashError>;

    /// One streaming digest over `items` in the given order.
    fn digest_strings(&self, items: &[&str]) -> ContentHash;

    /// Digest over a multiset of hashes. `hashes` must already be sorted.
    fn combine(&self, hashes: &[ContentHash]) -> ContentHash {
        let items: Vec<&str> = hashes.iter().map(ContentHash::as_str).collect();
        self.digest_strings(&items)
    }
}

/// [`Hasher`] reading local files, with an optional [`HashCache`].
#[derive(Clone)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    partial_window: usize,
    cache: Option<Arc<dyn HashCache>>,
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("algorithm", &self.algorithm)
            .field("partial_window", &self.partial_window)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_PARTIAL_WINDOW)
    }
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm, partial_window: usize) -> Self {
        Self {
            algorithm,
            partial_window: partial_window.max(1),
            cache: None,
        }
    }

    /// Consult and fill `cache` for file digests.
    pub fn with_cache(mut self, cache: Arc<dyn HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn partial_window(&self) -> usize {
        self.partial_window
    }

    /// Look up a still-valid cache entry, otherwise compute and remember.
    fn cached(
        &self,
        path: &Path,
        kind: HashKind,
        file: File,
        compute: impl FnOnce(File, u64) -> std::io::Result<ContentHash>,
    ) -> Result<ContentHash, HashError> {
        let metadata = file.metadata().map_err(|e| HashError::io(path, e))?;
        let len = metadata.len();
        let modified: Option<SystemTime> = metadata.modified().ok();
        let window = match kind {
            HashKind::Partial => Some(self.partial_window),
            HashKind::Full => None,
        };

        if let (Some(cache), Some(modified)) = (&self.cache, modified) {
            if let Some(entry) = cache.get(path, kind) {
                if entry.is_valid_for(modified, self.algorithm, window) {
                    trace!(path = %path.display(), ?kind, "hash cache hit");
                    return Ok(entry.hash);
                }
            }
        }

        let hash = compute(file, len).map_err(|e| HashError::io(path, e))?;

        if let (Some(cache), Some(modified)) = (&self.cache, modified) {
            cache.put(
                path,
                kind,
                CachedHash {
                    modified,
                    algorithm: self.algorithm,
                    window,
                    hash: hash.clone(),
                },
            );
        }
        Ok(hash)
    }
}

/// Read up to `limit` bytes from the current position.
fn read_window(file: &mut File, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit);
    file.by_ref().take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

impl Hasher for ContentHasher {
    fn digest_file_full(&self, path: &Path) -> Result<ContentHash, HashError> {
        let file = File::open(path).map_err(|e| HashError::io(path, e))?;
        let algorithm = self.algorithm;

        self.cached(path, HashKind::Full, file, |mut file, len| {
            let mut digest = StreamingDigest::new(algorithm);
            let mut buffer = vec![0u8; FULL_HASH_BUFFER.min(len as usize).max(1)];
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                digest.update(&buffer[..n]);
            }
            Ok(digest.finalize())
        })
    }

    fn digest_file_partial(&self, path: &Path) -> Result<ContentHash, HashError> {
        let file = File::open(path).map_err(|e| HashError::io(path, e))?;
        let algorithm = self.algorithm;
        let window = self.partial_window;

        self.cached(path, HashKind::Partial, file, |mut file, len| {
            let mut digest = StreamingDigest::new(algorithm);
            digest.update(&read_window(&mut file, window)?);

            // Small files contribute their content once; larger ones add
            // the tail window, which may overlap the head.
            if len > window as u64 {
                file.seek(SeekFrom::End(-(window as i64)))?;
                digest.update(&read_window(&mut file, window)?);
            }
            Ok(digest.finalize())
        })
    }

    fn digest_strings(&self, items: &[&str]) -> ContentHash {
        let mut digest = StreamingDigest::new(self.algorithm);
        for item in items {
            digest.update(item.as_bytes());
        }
        digest.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryHashCache;
    use sha2::Digest;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_full_hash_matches_plain_sha512() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"hello world").unwrap();

        let expected = ContentHash::from_digest(&sha2::Sha512::digest(b"hello world"));
        assert_eq!(ContentHasher::default().digest_file_full(&path).unwrap(), expected);
    }

    #[test]
    fn test_blake3_full_hash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"hello world").unwrap();

        let hasher = ContentHasher::new(HashAlgorithm::Blake3, DEFAULT_PARTIAL_WINDOW);
        let expected = ContentHash::from_digest(blake3::hash(b"hello world").as_bytes());
        assert_eq!(hasher.digest_file_full(&path).unwrap(), expected);
    }

    #[test]
    fn test_small_file_partial_hash_reads_content_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("small");
        let content = vec![7u8; 512];
        fs::write(&path, &content).unwrap();

        let hasher = ContentHasher::default();
        let partial = hasher.digest_file_partial(&path).unwrap();
        assert_eq!(partial, ContentHash::from_digest(&sha2::Sha512::digest(&content)));
        assert_eq!(partial, hasher.digest_file_full(&path).unwrap());
    }

    #[test]
    fn test_partial_hash_uses_head_and_tail() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big");
        let content: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let mut sha = sha2::Sha512::new();
        sha.update(&content[..512]);
        sha.update(&content[content.len() - 512..]);
        let expected = ContentHash::from_digest(&sha.finalize());

        assert_eq!(ContentHasher::default().digest_file_partial(&path).unwrap(), expected);
    }

    #[test]
    fn test_partial_hash_ignores_middle() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let mut content = vec![1u8; 4096];
        fs::write(&a, &content).unwrap();
        content[2000] = 9;
        fs::write(&b, &content).unwrap();

        let hasher = ContentHasher::default();
        assert_eq!(
            hasher.digest_file_partial(&a).unwrap(),
            hasher.digest_file_partial(&b).unwrap()
        );
        assert_ne!(
            hasher.digest_file_full(&a).unwrap(),
            hasher.digest_file_full(&b).unwrap()
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = ContentHasher::default()
            .digest_file_full(&temp.path().join("gone"))
            .unwrap_err();
        assert!(matches!(err, HashError::Io { .. }));
    }

    #[test]
    fn test_combine_is_order_sensitive_so_callers_sort() {
        let hasher = ContentHasher::default();
        let a = ContentHash::from_digest(&[0x01]);
        let b = ContentHash::from_digest(&[0x02]);
        assert_ne!(
            hasher.combine(&[a.clone(), b.clone()]),
            hasher.combine(&[b, a])
        );
    }

    #[test]
    fn test_cache_hit_requires_matching_mtime() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"real content").unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        let cache = Arc::new(MemoryHashCache::new());
        let planted = ContentHash::from_digest(&[0xab; 4]);
        cache.put(
            &path,
            HashKind::Full,
            CachedHash {
                modified,
                algorithm: HashAlgorithm::Sha512,
                window: None,
                hash: planted.clone(),
            },
        );
        let hasher = ContentHasher::default().with_cache(cache.clone());
        assert_eq!(hasher.digest_file_full(&path).unwrap(), planted);

        cache.put(
            &path,
            HashKind::Full,
            CachedHash {
                modified: modified - Duration::from_secs(60),
                algorithm: HashAlgorithm::Sha512,
                window: None,
                hash: planted.clone(),
            },
        );
        let fresh = hasher.digest_file_full(&path).unwrap();
        assert_ne!(fresh, planted);
        assert_eq!(cache.get(&path, HashKind::Full).unwrap().hash, fresh);
    }

    #[test]
    fn test_partial_cache_entry_from_other_window_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        let content: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let cache = Arc::new(MemoryHashCache::new());
        let narrow = ContentHasher::new(HashAlgorithm::Sha512, 512).with_cache(cache.clone());
        let narrow_hash = narrow.digest_file_partial(&path).unwrap();
        assert_eq!(cache.get(&path, HashKind::Partial).unwrap().window, Some(512));

        let wide = ContentHasher::new(HashAlgorithm::Sha512, 4096).with_cache(cache.clone());
        let wide_hash = wide.digest_file_partial(&path).unwrap();
        let uncached = ContentHasher::new(HashAlgorithm::Sha512, 4096);
        assert_ne!(wide_hash, narrow_hash);
        assert_eq!(wide_hash, uncached.digest_file_partial(&path).unwrap());
        assert_eq!(cache.get(&path, HashKind::Partial).unwrap().window, Some(4096));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert_eq!("blake3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
