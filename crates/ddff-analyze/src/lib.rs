//! Duplicate analysis for ddff.
//!
//! This crate finds duplicate files and directories in a scanned forest:
//!
//! - **Exact duplicates** - files or whole directory trees with identical content
//! - **Fuzzy directory duplicates** - directories sharing several identical files
//!
//! # Elimination Pipeline
//!
//! File content is only read when cheaper discriminators cannot rule a
//! node out:
//!
//! 1. Bucket every node by size (no I/O)
//! 2. Hash the first and last 512 bytes of files whose size is shared
//! 3. Hash the full content of files whose partial hash is shared
//! 4. Drop the children of directories that are identical as a whole
//!
//! Directory hashes combine the sorted hashes of their children, so two
//! directories match exactly when their contents match recursively.
//!
//! ```rust,ignore
//! use ddff_analyze::DuplicateFinder;
//! use ddff_scan::{ScanConfig, TreeBuilder};
//!
//! let mut tree = TreeBuilder::new().build(&ScanConfig::new("/path/to/scan")).unwrap();
//! let report = DuplicateFinder::new().find_duplicates(&mut tree).unwrap();
//!
//! report.write_text(&mut std::io::stdout()).unwrap();
//! ```
//!
//! # Hash Cache
//!
//! [`ContentHasher`] can consult a [`HashCache`] keyed by path and
//! modification time; [`JsonHashCache`] keeps it between runs.

pub mod cache;
mod config;
mod duplicates;
mod error;
pub mod grouping;
mod hasher;
pub mod pipeline;
mod report;

pub use cache::{CachedHash, HashCache, HashKind, JsonHashCache, MemoryHashCache};
pub use config::{AnalyzeConfig, AnalyzeConfigBuilder};
pub use duplicates::DuplicateFinder;
pub use error::{AnalyzeError, CacheError, InvariantViolation};
pub use hasher::{ContentHasher, DEFAULT_PARTIAL_WINDOW, HashAlgorithm, Hasher};
pub use pipeline::{EliminationPipeline, HashProgress, HashStage, PipelineStats};
pub use report::{DuplicateReport, DuplicateResult, ExactGroup, FuzzyDirGroup, format_size_approx};

// Re-export core types
pub use ddff_core::{ContentHash, FileTree, HashError, HashSlot, NodeId, NodeTree};
