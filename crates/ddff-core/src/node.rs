//! File and directory node types.

use std::fmt;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Handle of a node inside a [`NodeTree`](crate::NodeTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new NodeId from a raw index.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Content digest rendered as lowercase hex.
///
/// Ordering is the ordering of the hex strings, which is what directory hash
/// combination sorts by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(CompactString);

impl ContentHash {
    /// Create a hash from raw digest bytes.
    pub fn from_digest(bytes: &[u8]) -> Self {
        let mut hex = CompactString::with_capacity(bytes.len() * 2);
        for b in bytes {
            hex.push(HEX[(b >> 4) as usize] as char);
            hex.push(HEX[(b & 0x0f) as usize] as char);
        }
        Self(hex)
    }

    /// Parse a hex string, rejecting anything that is not lowercase hex.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = !hex.is_empty()
            && hex.len() % 2 == 0
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(CompactString::from(hex)))
    }

    /// The hash as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Memoized outcome of a hash computation for one node.
///
/// A slot leaves `Pending` at most once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashSlot {
    /// Not computed yet.
    #[default]
    Pending,
    /// Computed successfully.
    Ready(ContentHash),
    /// Computation failed or the node was not eligible.
    Unavailable,
}

impl HashSlot {
    /// The hash, if one was computed.
    pub fn hash(&self) -> Option<&ContentHash> {
        match self {
            HashSlot::Ready(hash) => Some(hash),
            _ => None,
        }
    }

    /// Whether the slot still awaits computation.
    pub fn is_pending(&self) -> bool {
        matches!(self, HashSlot::Pending)
    }
}

/// Type of file system node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }
}

/// A single file or directory in the scanned forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    kind: NodeKind,

    /// Fully-qualified location used for all I/O.
    path: PathBuf,

    /// Directory part of the identity, always separator-terminated.
    /// For a directory this is the directory itself.
    dir_path: CompactString,

    /// File name (empty for directories).
    file_name: CompactString,

    /// Size in bytes (aggregate for directories).
    pub size: u64,

    size_unique: bool,
    partial_hash_unique: bool,
    full_hash_unique: bool,
    already_reported: bool,

    /// Memoized partial hash.
    pub partial_hash: HashSlot,

    /// Memoized full hash.
    pub full_hash: HashSlot,

    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, kind: NodeKind, path: PathBuf) -> Self {
        let (dir_path, file_name) = match kind {
            NodeKind::Directory => (separator_terminated(&path), CompactString::default()),
            NodeKind::File => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                let name = path
                    .file_name()
                    .map(|n| CompactString::new(n.to_string_lossy()))
                    .unwrap_or_default();
                (separator_terminated(dir), name)
            }
        };

        Self {
            id,
            parent,
            kind,
            path,
            dir_path,
            file_name,
            size: 0,
            size_unique: false,
            partial_hash_unique: false,
            full_hash_unique: false,
            already_reported: false,
            partial_hash: HashSlot::Pending,
            full_hash: HashSlot::Pending,
            children: Vec::new(),
        }
    }

    /// Arena handle of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent handle (`None` only for the synthetic root).
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Node type.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Separator-terminated directory path.
    pub fn dir_path(&self) -> &str {
        &self.dir_path
    }

    /// File name, empty for directories.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Name used in reports: the directory path for directories,
    /// directory path plus file name for files.
    pub fn full_name(&self) -> String {
        match self.kind {
            NodeKind::Directory => self.dir_path.to_string(),
            NodeKind::File => format!("{}{}", self.dir_path, self.file_name),
        }
    }

    /// Handles of the direct children.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_size_unique(&self) -> bool {
        self.size_unique
    }

    pub fn is_partial_hash_unique(&self) -> bool {
        self.partial_hash_unique
    }

    pub fn is_full_hash_unique(&self) -> bool {
        self.full_hash_unique
    }

    /// True while no discriminator has proven the node unique.
    pub fn is_candidate(&self) -> bool {
        !(self.size_unique || self.partial_hash_unique || self.full_hash_unique)
    }

    pub fn is_already_reported(&self) -> bool {
        self.already_reported
    }

    /// Flags can only be raised, never cleared.
    pub fn mark_size_unique(&mut self) {
        self.size_unique = true;
    }

    pub fn mark_partial_hash_unique(&mut self) {
        self.partial_hash_unique = true;
    }

    pub fn mark_full_hash_unique(&mut self) {
        self.full_hash_unique = true;
    }

    pub fn mark_reported(&mut self) {
        self.already_reported = true;
    }
}

/// Render a path as a string that ends with the platform separator.
pub fn separator_terminated(path: &Path) -> CompactString {
    let mut s = CompactString::new(path.to_string_lossy());
    if !s.ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR);
    }
    s
}
