//! Depth-first tree builder.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use ddff_core::{
    FileTree, IgnoreMatcher, NodeId, NodeKind, NodeTree, ScanConfig, ScanError, ScanWarning,
    TreeStats,
};

use crate::progress::{ProgressReporter, ScanProgress};
use crate::provider::{FileSystemProvider, LocalFileSystem};

/// Builds the node forest for a set of root directories.
///
/// Traversal is single-threaded and depth-first: each subdirectory is fully
/// collected before the next sibling is looked at. An entry that cannot be
/// listed or sized is left out of the tree together with its subtree, and a
/// [`ScanWarning`] is recorded instead.
pub struct TreeBuilder<P = LocalFileSystem> {
    provider: P,
    progress_tx: broadcast::Sender<ScanProgress>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl TreeBuilder<LocalFileSystem> {
    /// Create a builder over the local file system.
    pub fn new() -> Self {
        Self::with_provider(LocalFileSystem)
    }
}

impl Default for TreeBuilder<LocalFileSystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: FileSystemProvider> TreeBuilder<P> {
    /// Create a builder over a custom file system provider.
    pub fn with_provider(provider: P) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            provider,
            progress_tx,
            interrupt: None,
        }
    }

    /// Stop the scan between entries once `flag` becomes true.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan every root in `config` under one synthetic root node.
    pub fn build(&self, config: &ScanConfig) -> Result<FileTree, ScanError> {
        let start = Instant::now();
        let matcher = config.ignore_matcher()?;
        let roots = self.normalize_roots(&config.roots)?;

        let mut nodes = NodeTree::new();
        let mut collector = Collector {
            provider: &self.provider,
            matcher,
            interrupt: self.interrupt.as_deref(),
            progress: ProgressReporter::new(&self.progress_tx),
            stats: TreeStats::new(),
            warnings: Vec::new(),
        };

        for root in &roots {
            info!(root = %root.display(), "scanning");
            let synthetic = nodes.root();
            match collector.collect_dir(&mut nodes, synthetic, root.clone(), 0) {
                Ok(id) => nodes.attach(id),
                Err(ScanError::Interrupted) => return Err(ScanError::Interrupted),
                Err(err) => collector.skip(root, &err, true),
            }
        }

        let Collector {
            progress,
            stats,
            warnings,
            ..
        } = collector;
        progress.finish();

        info!(
            files = stats.total_files,
            dirs = stats.total_dirs,
            skipped = stats.unreadable,
            "scan complete"
        );

        Ok(FileTree::new(
            nodes,
            roots,
            config.clone(),
            stats,
            start.elapsed(),
            warnings,
        ))
    }

    /// Resolve, sort and de-duplicate the roots; drop roots nested inside
    /// another root so no file is visited twice.
    fn normalize_roots(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
        let mut resolved = roots
            .iter()
            .map(|r| self.provider.resolve_root(r))
            .collect::<Result<Vec<_>, _>>()?;
        resolved.sort();
        resolved.dedup();

        let mut kept: Vec<PathBuf> = Vec::with_capacity(resolved.len());
        for root in resolved {
            if let Some(outer) = kept.iter().find(|k| root.starts_with(k)) {
                warn!(
                    root = %root.display(),
                    inside = %outer.display(),
                    "root is inside another root, skipping"
                );
                continue;
            }
            kept.push(root);
        }
        Ok(kept)
    }
}

/// Mutable state of one scan.
struct Collector<'a, P> {
    provider: &'a P,
    matcher: IgnoreMatcher,
    interrupt: Option<&'a AtomicBool>,
    progress: ProgressReporter<'a>,
    stats: TreeStats,
    warnings: Vec<ScanWarning>,
}

impl<P: FileSystemProvider> Collector<'_, P> {
    fn interrupted(&self) -> bool {
        self.interrupt.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Collect a directory and, recursively, everything below it.
    fn collect_dir(
        &mut self,
        tree: &mut NodeTree,
        parent: NodeId,
        path: PathBuf,
        depth: u32,
    ) -> Result<NodeId, ScanError> {
        if self.interrupted() {
            return Err(ScanError::Interrupted);
        }

        let mut entries = self.provider.list_entries(&path)?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let id = tree.allocate(parent, NodeKind::Directory, path.clone(), 0);
        self.stats.record_dir(depth);
        self.progress.enter_dir(path.clone());

        for entry in entries {
            if entry.is_pseudo() {
                continue;
            }
            if entry.is_link {
                debug!(path = %path.join(&*entry.name).display(), "skipping link");
                self.stats.record_link();
                self.progress.skipped();
                continue;
            }
            if entry.is_special {
                debug!(path = %path.join(&*entry.name).display(), "skipping special file");
                self.stats.record_special();
                self.progress.skipped();
                continue;
            }
            if self.matcher.should_skip(&entry.name) {
                continue;
            }

            let child_path = path.join(&*entry.name);
            let collected = if entry.is_dir {
                self.collect_dir(tree, id, child_path.clone(), depth + 1)
            } else {
                self.collect_file(tree, id, child_path.clone(), depth + 1)
            };

            match collected {
                Ok(child) => tree.attach(child),
                Err(ScanError::Interrupted) => return Err(ScanError::Interrupted),
                Err(err) => self.skip(&child_path, &err, entry.is_dir),
            }
        }

        Ok(id)
    }

    fn collect_file(
        &mut self,
        tree: &mut NodeTree,
        parent: NodeId,
        path: PathBuf,
        depth: u32,
    ) -> Result<NodeId, ScanError> {
        let size = self.provider.file_size(&path)?;
        self.stats.record_file(path.clone(), size, depth);
        self.progress.file(size);

        Ok(tree.allocate(parent, NodeKind::File, path, size))
    }

    fn skip(&mut self, path: &Path, err: &ScanError, is_dir: bool) {
        debug!(path = %path.display(), error = %err, "leaving out unreadable entry");
        self.stats.record_unreadable();
        self.progress.unreadable();
        self.warnings.push(ScanWarning::from_error(path, err, is_dir));
    }
}
