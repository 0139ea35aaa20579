//! The elimination pipeline.
//!
//! Four discriminators of increasing cost mark nodes as unique so that later
//! stages never touch them:
//!
//! 1. size, over every node of the forest
//! 2. partial hash (head and tail windows) of nodes whose size is shared
//! 3. full hash of nodes that also share their partial hash
//! 4. pruning of the children of directories proven identical as a whole
//!
//! Directory hashes combine the sorted multiset of their children's hashes
//! and are only available when every child produced one.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use ddff_core::{ContentHash, HashError, HashSlot, Node, NodeId, NodeTree};

use crate::error::{AnalyzeError, InvariantViolation};
use crate::hasher::Hasher;

/// Files between two progress broadcasts.
const PROGRESS_INTERVAL: u64 = 256;

/// The two hashing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashStage {
    Partial,
    Full,
}

impl HashStage {
    fn slot(self, node: &Node) -> &HashSlot {
        match self {
            HashStage::Partial => &node.partial_hash,
            HashStage::Full => &node.full_hash,
        }
    }

    fn slot_mut(self, node: &mut Node) -> &mut HashSlot {
        match self {
            HashStage::Partial => &mut node.partial_hash,
            HashStage::Full => &mut node.full_hash,
        }
    }

    /// Whether a node takes part in this stage's buckets.
    fn is_eligible(self, node: &Node) -> bool {
        match self {
            HashStage::Partial => !node.is_size_unique(),
            HashStage::Full => !node.is_size_unique() && !node.is_partial_hash_unique(),
        }
    }

    fn digest(self, hasher: &dyn Hasher, node: &Node) -> Result<ContentHash, HashError> {
        if !self.is_eligible(node) {
            return Err(HashError::Ineligible {
                path: node.path().to_path_buf(),
            });
        }
        match self {
            HashStage::Partial => hasher.digest_file_partial(node.path()),
            HashStage::Full => hasher.digest_file_full(node.path()),
        }
    }
}

/// Progress information during hashing.
#[derive(Debug, Clone)]
pub struct HashProgress {
    pub stage: HashStage,
    /// Files hashed so far in this stage.
    pub files_hashed: u64,
    /// Eligible files of this stage.
    pub total_files: u64,
    /// Bytes of file content covered by this stage so far.
    pub bytes_hashed: u64,
    /// Files that could not be hashed.
    pub failures: u64,
    pub current_file: Option<PathBuf>,
}

/// Counters describing one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Nodes considered by the size stage.
    pub nodes: u64,
    pub size_unique: u64,
    pub partial_hash_unique: u64,
    pub full_hash_unique: u64,
    /// File digests computed across both hashing stages.
    pub files_hashed: u64,
    /// File digests that failed with an I/O error.
    pub hash_failures: u64,
    /// Directories whose children were pruned.
    pub pruned_directories: u64,
}

/// Runs the four elimination stages over a node arena.
pub struct EliminationPipeline<'a> {
    hasher: &'a dyn Hasher,
    pool: Option<&'a rayon::ThreadPool>,
    parallel: bool,
    interrupt: Option<&'a AtomicBool>,
    progress_tx: Option<&'a broadcast::Sender<HashProgress>>,
    stats: PipelineStats,
    progress: Option<HashProgress>,
}

impl<'a> EliminationPipeline<'a> {
    /// Sequential pipeline over `hasher`.
    pub fn new(hasher: &'a dyn Hasher) -> Self {
        Self {
            hasher,
            pool: None,
            parallel: false,
            interrupt: None,
            progress_tx: None,
            stats: PipelineStats::default(),
            progress: None,
        }
    }

    /// Compute file digests on rayon before each sequential stage walk.
    /// Without a dedicated `pool` the global one is used.
    pub fn parallel(mut self, pool: Option<&'a rayon::ThreadPool>) -> Self {
        self.parallel = true;
        self.pool = pool;
        self
    }

    /// Stop between files once `flag` becomes true.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn with_progress(mut self, tx: &'a broadcast::Sender<HashProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn into_stats(self) -> PipelineStats {
        self.stats
    }

    /// Run all four stages.
    pub fn run(&mut self, tree: &mut NodeTree) -> Result<(), AnalyzeError> {
        self.mark_unique_sizes(tree);
        self.mark_unique_hashes(tree, HashStage::Partial)?;
        self.mark_unique_hashes(tree, HashStage::Full)?;
        self.prune_identical_directories(tree)?;
        Ok(())
    }

    fn check_interrupt(&self) -> Result<(), AnalyzeError> {
        if self.interrupt.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(AnalyzeError::Interrupted);
        }
        Ok(())
    }

    /// Stage 1: every node alone in its size bucket is size-unique.
    pub fn mark_unique_sizes(&mut self, tree: &mut NodeTree) {
        let mut buckets: BTreeMap<u64, Vec<NodeId>> = BTreeMap::new();
        for id in tree.descendants() {
            buckets.entry(tree[id].size).or_default().push(id);
        }

        self.stats.nodes = buckets.values().map(|b| b.len() as u64).sum();
        for bucket in buckets.values() {
            if let [only] = bucket.as_slice() {
                tree[*only].mark_size_unique();
                self.stats.size_unique += 1;
            }
        }

        info!(
            nodes = self.stats.nodes,
            unique = self.stats.size_unique,
            "size stage complete"
        );
    }

    /// Stages 2 and 3: bucket eligible nodes by hash and mark singletons.
    pub fn mark_unique_hashes(
        &mut self,
        tree: &mut NodeTree,
        stage: HashStage,
    ) -> Result<(), AnalyzeError> {
        if self.parallel {
            self.prefetch_files(tree, stage)?;
        }

        let buckets = self.hash_buckets(tree, stage)?;

        let mut unique = 0u64;
        for bucket in buckets.values() {
            if let [only] = bucket.as_slice() {
                match stage {
                    HashStage::Partial => tree[*only].mark_partial_hash_unique(),
                    HashStage::Full => tree[*only].mark_full_hash_unique(),
                }
                unique += 1;
            }
        }
        match stage {
            HashStage::Partial => self.stats.partial_hash_unique = unique,
            HashStage::Full => self.stats.full_hash_unique = unique,
        }

        self.finish_progress();
        info!(?stage, buckets = buckets.len(), unique, "hash stage complete");
        Ok(())
    }

    /// Hash every eligible reachable node and bucket the ones that produced
    /// a hash.
    fn hash_buckets(
        &mut self,
        tree: &mut NodeTree,
        stage: HashStage,
    ) -> Result<BTreeMap<ContentHash, Vec<NodeId>>, AnalyzeError> {
        self.start_progress(tree, stage);

        let ids: Vec<NodeId> = tree.descendants().collect();
        let mut buckets: BTreeMap<ContentHash, Vec<NodeId>> = BTreeMap::new();
        for id in ids {
            if !stage.is_eligible(&tree[id]) {
                continue;
            }
            if let Some(hash) = self.ensure_hash(tree, id, stage)? {
                buckets.entry(hash).or_default().push(id);
            }
        }
        Ok(buckets)
    }

    /// Memoized hash of a node for `stage`, computing it on first use.
    ///
    /// A directory's hash needs every child's hash; the first failing child
    /// makes the directory unavailable too.
    pub fn ensure_hash(
        &mut self,
        tree: &mut NodeTree,
        id: NodeId,
        stage: HashStage,
    ) -> Result<Option<ContentHash>, AnalyzeError> {
        match stage.slot(&tree[id]) {
            HashSlot::Ready(hash) => return Ok(Some(hash.clone())),
            HashSlot::Unavailable => return Ok(None),
            HashSlot::Pending => {}
        }

        let outcome = if tree[id].is_dir() {
            let children = tree.children(id).to_vec();
            let mut hashes = Vec::with_capacity(children.len());
            let mut complete = true;
            for child in children {
                match self.ensure_hash(tree, child, stage)? {
                    Some(hash) => hashes.push(hash),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                hashes.sort();
                Some(self.hasher.combine(&hashes))
            } else {
                None
            }
        } else {
            self.check_interrupt()?;
            match stage.digest(self.hasher, &tree[id]) {
                Ok(hash) => {
                    self.record_file(&tree[id], true);
                    Some(hash)
                }
                Err(HashError::Ineligible { .. }) => None,
                Err(err) => {
                    debug!(path = %tree[id].path().display(), error = %err, "no hash for file");
                    self.record_file(&tree[id], false);
                    None
                }
            }
        };

        *stage.slot_mut(&mut tree[id]) = match &outcome {
            Some(hash) => HashSlot::Ready(hash.clone()),
            None => HashSlot::Unavailable,
        };
        Ok(outcome)
    }

    /// Compute pending, eligible file digests on the thread pool and store
    /// each one write-once in its node.
    fn prefetch_files(&mut self, tree: &mut NodeTree, stage: HashStage) -> Result<(), AnalyzeError> {
        let pending: Vec<(NodeId, PathBuf)> = tree
            .descendants()
            .filter(|id| {
                let node = &tree[*id];
                node.is_file() && stage.is_eligible(node) && stage.slot(node).is_pending()
            })
            .map(|id| (id, tree[id].path().to_path_buf()))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        debug!(?stage, files = pending.len(), "hashing files in parallel");

        let hasher = self.hasher;
        let interrupt = self.interrupt;
        let work = || {
            pending
                .par_iter()
                .map(|(id, path)| {
                    if interrupt.is_some_and(|f| f.load(Ordering::Relaxed)) {
                        return (*id, Err(HashError::Interrupted));
                    }
                    let digest = match stage {
                        HashStage::Partial => hasher.digest_file_partial(path),
                        HashStage::Full => hasher.digest_file_full(path),
                    };
                    (*id, digest)
                })
                .collect::<Vec<_>>()
        };
        let results = match self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        };

        self.check_interrupt()?;
        self.start_progress(tree, stage);
        for (id, result) in results {
            let slot = stage.slot_mut(&mut tree[id]);
            if !slot.is_pending() {
                continue;
            }
            *slot = match result {
                Ok(hash) => HashSlot::Ready(hash),
                Err(HashError::Interrupted) => return Err(AnalyzeError::Interrupted),
                Err(err) => {
                    debug!(error = %err, "no hash for file");
                    HashSlot::Unavailable
                }
            };
            let ok = matches!(stage.slot(&tree[id]), HashSlot::Ready(_));
            self.record_file(&tree[id], ok);
        }
        Ok(())
    }

    /// Full-hash buckets of nodes that reached stage 3.
    fn full_hash_buckets(&self, tree: &NodeTree) -> BTreeMap<ContentHash, Vec<NodeId>> {
        let mut buckets: BTreeMap<ContentHash, Vec<NodeId>> = BTreeMap::new();
        for id in tree.descendants() {
            let node = &tree[id];
            if !HashStage::Full.is_eligible(node) {
                continue;
            }
            if let Some(hash) = node.full_hash.hash() {
                buckets.entry(hash.clone()).or_default().push(id);
            }
        }
        buckets
    }

    /// Stage 4: directories sharing a full hash with another directory lose
    /// their children, so only the directories themselves get reported.
    pub fn prune_identical_directories(&mut self, tree: &mut NodeTree) -> Result<(), AnalyzeError> {
        let buckets = self.full_hash_buckets(tree);

        for bucket in buckets.values() {
            if bucket.len() < 2 {
                continue;
            }
            if bucket.iter().map(|id| tree[*id].size).sum::<u64>() == 0 {
                continue;
            }
            if !same_kind(tree, bucket)? {
                continue;
            }
            for id in bucket {
                tree.clear_children(*id);
                self.stats.pruned_directories += 1;
            }
        }

        info!(pruned = self.stats.pruned_directories, "prune stage complete");
        Ok(())
    }

    fn start_progress(&mut self, tree: &NodeTree, stage: HashStage) {
        let Some(tx) = self.progress_tx else {
            return;
        };
        let total_files = tree
            .descendants()
            .filter(|id| tree[*id].is_file() && stage.is_eligible(&tree[*id]))
            .count() as u64;
        // the parallel prefetch already counted part of this stage
        let (files_hashed, bytes_hashed, failures) = self
            .progress
            .as_ref()
            .filter(|p| p.stage == stage)
            .map_or((0, 0, 0), |p| (p.files_hashed, p.bytes_hashed, p.failures));
        let progress = HashProgress {
            stage,
            files_hashed,
            total_files,
            bytes_hashed,
            failures,
            current_file: None,
        };
        let _ = tx.send(progress.clone());
        self.progress = Some(progress);
    }

    fn record_file(&mut self, node: &Node, ok: bool) {
        if ok {
            self.stats.files_hashed += 1;
        } else {
            self.stats.hash_failures += 1;
        }

        let (Some(tx), Some(progress)) = (self.progress_tx, self.progress.as_mut()) else {
            return;
        };
        if ok {
            progress.files_hashed += 1;
            progress.bytes_hashed += node.size;
        } else {
            progress.failures += 1;
        }
        progress.current_file = Some(node.path().to_path_buf());
        if (progress.files_hashed + progress.failures) % PROGRESS_INTERVAL == 0 {
            let _ = tx.send(progress.clone());
        }
    }

    fn finish_progress(&mut self) {
        if let (Some(tx), Some(progress)) = (self.progress_tx, self.progress.take()) {
            let _ = tx.send(progress);
        }
    }
}

/// Whether a bucket holds directories. Fails when it mixes kinds.
pub(crate) fn same_kind(tree: &NodeTree, bucket: &[NodeId]) -> Result<bool, InvariantViolation> {
    let Some(first) = bucket.first() else {
        return Ok(false);
    };
    let is_dir = tree[*first].is_dir();
    if bucket.iter().any(|id| tree[*id].is_dir() != is_dir) {
        return Err(InvariantViolation::MixedKindsInBucket {
            paths: bucket.iter().map(|id| tree[*id].full_name()).collect(),
        });
    }
    Ok(is_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::ContentHasher;
    use ddff_core::NodeKind;
    use std::fs;
    use tempfile::TempDir;

    /// Arena over a real directory, built without the scanner.
    fn tree_of(root: &std::path::Path, files: &[(&str, &[u8])]) -> NodeTree {
        let mut tree = NodeTree::new();
        let top = tree.allocate(tree.root(), NodeKind::Directory, root.to_path_buf(), 0);
        for (name, content) in files {
            let path = root.join(name);
            fs::write(&path, content).unwrap();
            let id = tree.allocate(top, NodeKind::File, path, content.len() as u64);
            tree.attach(id);
        }
        tree.attach(top);
        tree
    }

    fn file_id(tree: &NodeTree, name: &str) -> NodeId {
        tree.descendants()
            .find(|id| tree[*id].file_name() == name)
            .unwrap()
    }

    #[test]
    fn test_size_stage_marks_singletons() {
        let temp = TempDir::new().unwrap();
        let mut tree = tree_of(temp.path(), &[("a", b"12"), ("b", b"34"), ("c", b"567")]);
        let hasher = ContentHasher::default();
        let mut pipeline = EliminationPipeline::new(&hasher);
        pipeline.mark_unique_sizes(&mut tree);

        assert!(!tree[file_id(&tree, "a")].is_size_unique());
        assert!(tree[file_id(&tree, "c")].is_size_unique());
        // the directory (7 bytes) is alone too
        assert_eq!(pipeline.stats().size_unique, 2);
    }

    #[test]
    fn test_size_unique_file_gets_no_hash() {
        let temp = TempDir::new().unwrap();
        let mut tree = tree_of(temp.path(), &[("a", b"12"), ("b", b"345")]);
        let hasher = ContentHasher::default();
        let mut pipeline = EliminationPipeline::new(&hasher);
        pipeline.run(&mut tree).unwrap();

        let a = file_id(&tree, "a");
        assert_eq!(tree[a].partial_hash, HashSlot::Pending);
        assert_eq!(tree[a].full_hash, HashSlot::Pending);
    }

    #[test]
    fn test_directory_hash_fails_with_child() {
        let temp = TempDir::new().unwrap();
        let mut tree = tree_of(temp.path(), &[("a", b"same"), ("b", b"same")]);
        let b = file_id(&tree, "b");
        fs::remove_file(tree[b].path()).unwrap();

        let hasher = ContentHasher::default();
        let mut pipeline = EliminationPipeline::new(&hasher);
        let dir = tree.children(tree.root())[0];
        assert_eq!(pipeline.ensure_hash(&mut tree, dir, HashStage::Partial).unwrap(), None);
        assert_eq!(tree[b].partial_hash, HashSlot::Unavailable);
        assert_eq!(tree[dir].partial_hash, HashSlot::Unavailable);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let temp = TempDir::new().unwrap();
        let files: &[(&str, &[u8])] = &[("a", b"alpha"), ("b", b"alpha"), ("c", b"gamma")];
        let hasher = ContentHasher::default();

        let mut seq = tree_of(temp.path(), files);
        EliminationPipeline::new(&hasher).run(&mut seq).unwrap();

        let mut par = tree_of(temp.path(), files);
        EliminationPipeline::new(&hasher)
            .parallel(None)
            .run(&mut par)
            .unwrap();

        for (x, y) in seq.descendants().zip(par.descendants()) {
            assert_eq!(seq[x].full_hash, par[y].full_hash);
            assert_eq!(seq[x].is_candidate(), par[y].is_candidate());
        }
    }

    #[test]
    fn test_interrupt_stops_hashing() {
        let temp = TempDir::new().unwrap();
        let mut tree = tree_of(temp.path(), &[("a", b"xx"), ("b", b"xx")]);
        let hasher = ContentHasher::default();
        let flag = AtomicBool::new(true);
        let result = EliminationPipeline::new(&hasher)
            .with_interrupt(&flag)
            .run(&mut tree);
        assert!(matches!(result, Err(AnalyzeError::Interrupted)));
    }

    #[test]
    fn test_mixed_bucket_is_rejected() {
        let mut tree = NodeTree::new();
        let root = tree.root();
        let f = tree.allocate(root, NodeKind::File, PathBuf::from("/f"), 1);
        let d = tree.allocate(root, NodeKind::Directory, PathBuf::from("/d"), 0);
        tree.attach(f);
        tree.attach(d);

        assert!(matches!(
            same_kind(&tree, &[f, d]),
            Err(InvariantViolation::MixedKindsInBucket { .. })
        ));
        assert_eq!(same_kind(&tree, &[f]), Ok(false));
    }
}
