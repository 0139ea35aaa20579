//! Duplicate detection over a scanned tree.
//!
//! Runs the elimination pipeline, then the fuzzy directory pass, then the
//! exact pass, and collects the results into a [`DuplicateReport`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::info;

use ddff_core::FileTree;

use crate::config::AnalyzeConfig;
use crate::error::AnalyzeError;
use crate::grouping::{exact_groups, fuzzy_directory_groups};
use crate::hasher::{ContentHasher, Hasher};
use crate::pipeline::{EliminationPipeline, HashProgress};
use crate::report::DuplicateReport;

/// Duplicate file and directory finder.
pub struct DuplicateFinder {
    config: AnalyzeConfig,
    hasher: Arc<dyn Hasher>,
    progress_tx: broadcast::Sender<HashProgress>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with default config.
    pub fn new() -> Self {
        Self::with_config(AnalyzeConfig::default())
    }

    /// Create a finder hashing local files as `config` describes.
    pub fn with_config(config: AnalyzeConfig) -> Self {
        let hasher = ContentHasher::new(config.algorithm, config.partial_window);
        Self::with_hasher(config, Arc::new(hasher))
    }

    /// Create a finder over a custom [`Hasher`]. The algorithm and window
    /// settings of `config` are then up to `hasher`.
    pub fn with_hasher(config: AnalyzeConfig, hasher: Arc<dyn Hasher>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            hasher,
            progress_tx,
            interrupt: None,
        }
    }

    /// Stop between files once `flag` becomes true.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Subscribe to hashing progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<HashProgress> {
        self.progress_tx.subscribe()
    }

    pub fn config(&self) -> &AnalyzeConfig {
        &self.config
    }

    /// Find duplicates in a scanned tree.
    ///
    /// The tree is consumed in the sense that hashes, uniqueness flags and
    /// pruned children stay behind in it; run once per scan.
    pub fn find_duplicates(&self, tree: &mut FileTree) -> Result<DuplicateReport, AnalyzeError> {
        let start = Instant::now();

        let pool = match self.config.threads {
            0 | 1 => None,
            n => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
        };

        let mut pipeline =
            EliminationPipeline::new(self.hasher.as_ref()).with_progress(&self.progress_tx);
        if self.config.is_parallel() {
            pipeline = pipeline.parallel(pool.as_ref());
        }
        if let Some(flag) = &self.interrupt {
            pipeline = pipeline.with_interrupt(flag);
        }

        pipeline.run(&mut tree.nodes)?;
        let stats = pipeline.into_stats();

        let mut results = fuzzy_directory_groups(
            &mut tree.nodes,
            self.hasher.as_ref(),
            self.config.fuzzy_min_shared_files,
        );
        results.extend(exact_groups(&tree.nodes)?);

        let report = DuplicateReport::new(results, stats);
        info!(
            exact = report.exact_count(),
            fuzzy = report.fuzzy_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "duplicate analysis complete"
        );
        Ok(report)
    }
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self::new()
    }
}
