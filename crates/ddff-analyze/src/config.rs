//! Analysis configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::hasher::{DEFAULT_PARTIAL_WINDOW, HashAlgorithm};

/// Configuration for the elimination pipeline and grouping passes.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), default)]
pub struct AnalyzeConfig {
    /// Digest used for file and directory hashes.
    pub algorithm: HashAlgorithm,

    /// Bytes read from each end of a file for the partial hash.
    pub partial_window: usize,

    /// Hashing threads: 0 uses the global rayon pool, 1 hashes strictly
    /// sequentially, anything else builds a dedicated pool.
    pub threads: usize,

    /// A fuzzy directory group is reported when the number of shared file
    /// names is strictly greater than this.
    pub fuzzy_min_shared_files: usize,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha512,
            partial_window: DEFAULT_PARTIAL_WINDOW,
            threads: 0,
            fuzzy_min_shared_files: 2,
        }
    }
}

impl AnalyzeConfig {
    /// Create a new config builder.
    pub fn builder() -> AnalyzeConfigBuilder {
        AnalyzeConfigBuilder::default()
    }

    /// Whether file digests are computed on a thread pool before the
    /// sequential directory pass.
    pub fn is_parallel(&self) -> bool {
        self.threads != 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzeConfig::default();
        assert_eq!(config.algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.partial_window, 512);
        assert_eq!(config.fuzzy_min_shared_files, 2);
        assert!(config.is_parallel());
    }

    #[test]
    fn test_builder_fills_defaults() {
        let config = AnalyzeConfig::builder()
            .algorithm(HashAlgorithm::Blake3)
            .threads(1usize)
            .build()
            .unwrap();
        assert_eq!(config.algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.partial_window, 512);
        assert!(!config.is_parallel());
    }
}
