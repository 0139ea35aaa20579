//! Error types for the elimination pipeline and the hash cache.

use std::path::PathBuf;

use thiserror::Error;

/// Corrupted intermediate state. Always aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A duplicate bucket holds both files and directories.
    #[error("bucket mixes files and directories: {paths:?}")]
    MixedKindsInBucket { paths: Vec<String> },

    /// Members of one full-hash bucket disagree on size.
    #[error("bucket members differ in size: {paths:?} ({sizes:?})")]
    SizeMismatchInBucket { paths: Vec<String>, sizes: Vec<u64> },
}

/// Errors that end an analysis run.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Hash collision class bug or corrupted state.
    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] InvariantViolation),

    /// The run was stopped on request.
    #[error("Analysis interrupted")]
    Interrupted,

    /// The hashing thread pool could not be created.
    #[error("failed to build hashing thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors reading or writing the persisted hash cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode hash cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
