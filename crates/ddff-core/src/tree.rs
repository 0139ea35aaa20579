//! Node arena, scanned tree container and statistics.

use std::ops::{Index, IndexMut};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::ScanWarning;
use crate::node::{Node, NodeId, NodeKind};

/// Arena owning every node of one run.
///
/// Parent and child relations are handles into the arena. Index 0 is the
/// synthetic root: a directory with no parent and size 0 that owns one child
/// per user-supplied root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTree {
    nodes: Vec<Node>,
}

impl NodeTree {
    /// Create a tree holding only the synthetic root.
    pub fn new() -> Self {
        let root = Node::new(NodeId::new(0), None, NodeKind::Directory, PathBuf::new());
        Self { nodes: vec![root] }
    }

    /// Handle of the synthetic root.
    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    /// Check whether `id` is the synthetic root.
    pub fn is_root(&self, id: NodeId) -> bool {
        id.index() == 0
    }

    /// Number of nodes in the arena, including the synthetic root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the synthetic root is present from construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Allocate a node under `parent` without linking it yet.
    ///
    /// The node becomes part of the tree once [`attach`](Self::attach) is
    /// called, after its own subtree has been collected.
    pub fn allocate(&mut self, parent: NodeId, kind: NodeKind, path: PathBuf, size: u64) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        let mut node = Node::new(id, Some(parent), kind, path);
        node.size = size;
        self.nodes.push(node);
        id
    }

    /// Link an allocated node into its parent's children and add its size to
    /// the parent. The synthetic root keeps size 0.
    pub fn attach(&mut self, id: NodeId) {
        let Some(parent) = self[id].parent() else {
            return;
        };
        let size = self[id].size;
        let parent_node = &mut self[parent];
        debug_assert!(parent_node.is_dir());
        if parent_node.children.contains(&id) {
            return;
        }
        parent_node.children.push(id);
        if !self.is_root(parent) {
            self[parent].size += size;
        }
    }

    /// Handles of the direct children of `id`.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self[id].children()
    }

    /// Drop every child link of `id`. The detached nodes stay in the arena
    /// but are no longer reachable from the root.
    pub fn clear_children(&mut self, id: NodeId) {
        self[id].children.clear();
    }

    /// All nodes reachable from the synthetic root, parents before children,
    /// excluding the synthetic root itself.
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(self.root()).to_vec();
        stack.reverse();
        Descendants { tree: self, stack }
    }

    /// Check that every reachable directory's size equals the sum of its
    /// children's sizes.
    pub fn sizes_consistent(&self) -> bool {
        self.descendants().all(|id| {
            let node = &self[id];
            !node.is_dir()
                || node.size == node.children().iter().map(|c| self[*c].size).sum::<u64>()
        })
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for NodeTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for NodeTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

/// Pre-order iterator over reachable nodes.
pub struct Descendants<'a> {
    tree: &'a NodeTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total size in bytes.
    pub total_size: u64,
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories, user roots included.
    pub total_dirs: u64,
    /// Symbolic links and reparse points that were skipped.
    pub skipped_links: u64,
    /// Pipes, sockets and device nodes that were skipped.
    #[serde(default)]
    pub skipped_special: u64,
    /// Entries left out because they could not be read.
    pub unreadable: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
    /// Largest file (path, size).
    pub largest_file: Option<(PathBuf, u64)>,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, path: PathBuf, size: u64, depth: u32) {
        self.total_files += 1;
        self.total_size += size;
        self.max_depth = self.max_depth.max(depth);

        if self.largest_file.as_ref().is_none_or(|(_, s)| size > *s) {
            self.largest_file = Some((path, size));
        }
    }

    /// Record a directory.
    pub fn record_dir(&mut self, depth: u32) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a skipped link.
    pub fn record_link(&mut self) {
        self.skipped_links += 1;
    }

    /// Record a skipped pipe, socket or device.
    pub fn record_special(&mut self) {
        self.skipped_special += 1;
    }

    /// Record an entry that could not be collected.
    pub fn record_unreadable(&mut self) {
        self.unreadable += 1;
    }
}

/// Complete scanned forest with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree {
    /// The node arena.
    pub nodes: NodeTree,

    /// Normalized root directories, in the order they were scanned.
    pub roots: Vec<PathBuf>,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Scan configuration used.
    pub config: ScanConfig,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during scan.
    pub warnings: Vec<ScanWarning>,
}

impl FileTree {
    /// Create a new file tree.
    pub fn new(
        nodes: NodeTree,
        roots: Vec<PathBuf>,
        config: ScanConfig,
        stats: TreeStats,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self {
            nodes,
            roots,
            scanned_at: SystemTime::now(),
            scan_duration,
            config,
            stats,
            warnings,
        }
    }

    /// Get the total size of all roots.
    pub fn total_size(&self) -> u64 {
        self.nodes
            .children(self.nodes.root())
            .iter()
            .map(|id| self.nodes[*id].size)
            .sum()
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
