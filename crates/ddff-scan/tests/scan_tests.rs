use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use ddff_scan::{
    DirEntryInfo, FileSystemProvider, ScanConfig, ScanError, TreeBuilder, WarningKind,
};

/// In-memory file system. Directories map to listings, files to sizes;
/// anything in `broken` fails with permission denied.
#[derive(Default)]
struct MemoryFs {
    dirs: BTreeMap<PathBuf, Vec<DirEntryInfo>>,
    files: BTreeMap<PathBuf, u64>,
    broken: Vec<PathBuf>,
}

impl MemoryFs {
    fn dir(mut self, path: &str, entries: Vec<DirEntryInfo>) -> Self {
        self.dirs.insert(PathBuf::from(path), entries);
        self
    }

    fn file(mut self, path: &str, size: u64) -> Self {
        self.files.insert(PathBuf::from(path), size);
        self
    }

    fn broken(mut self, path: &str) -> Self {
        self.broken.push(PathBuf::from(path));
        self
    }

    fn denied(path: &Path) -> ScanError {
        ScanError::io(path, io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }
}

impl FileSystemProvider for MemoryFs {
    fn list_entries(&self, dir: &Path) -> Result<Vec<DirEntryInfo>, ScanError> {
        if self.broken.iter().any(|b| b == dir) {
            return Err(Self::denied(dir));
        }
        self.dirs.get(dir).cloned().ok_or_else(|| ScanError::NotFound {
            path: dir.to_path_buf(),
        })
    }

    fn file_size(&self, path: &Path) -> Result<u64, ScanError> {
        if self.broken.iter().any(|b| b == path) {
            return Err(Self::denied(path));
        }
        self.files.get(path).copied().ok_or_else(|| ScanError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

fn sample_fs() -> MemoryFs {
    MemoryFs::default()
        .dir(
            "/r",
            vec![
                DirEntryInfo::dir("."),
                DirEntryInfo::dir(".."),
                DirEntryInfo::file("a"),
                DirEntryInfo::file("locked.bin"),
                DirEntryInfo::dir("private"),
                DirEntryInfo::dir("sub"),
                DirEntryInfo::link("shortcut"),
                DirEntryInfo::special("fifo"),
            ],
        )
        .dir("/r/sub", vec![DirEntryInfo::file("b"), DirEntryInfo::file("c")])
        .dir("/r/private", vec![DirEntryInfo::file("secret")])
        .file("/r/a", 10)
        .file("/r/locked.bin", 99)
        .file("/r/sub/b", 20)
        .file("/r/sub/c", 30)
        .file("/r/private/secret", 1000)
        .broken("/r/locked.bin")
        .broken("/r/private")
}

#[test]
fn test_unreadable_entries_are_excluded() {
    let builder = TreeBuilder::with_provider(sample_fs());
    let tree = builder.build(&ScanConfig::new("/r")).unwrap();

    let names: Vec<String> = tree
        .nodes
        .descendants()
        .map(|id| tree.nodes[id].full_name())
        .collect();

    assert!(!names.iter().any(|n| n.contains("locked")));
    assert!(!names.iter().any(|n| n.contains("private")));
    assert!(!names.iter().any(|n| n.contains("shortcut")));
    assert_eq!(tree.stats.unreadable, 2);
    assert!(!names.iter().any(|n| n.contains("fifo")));
    assert_eq!(tree.stats.skipped_links, 1);
    assert_eq!(tree.stats.skipped_special, 1);
    assert_eq!(tree.warnings.len(), 2);
    assert!(
        tree.warnings
            .iter()
            .all(|w| w.kind == WarningKind::PermissionDenied)
    );
}

#[test]
fn test_directory_size_counts_only_collected_children() {
    let tree = TreeBuilder::with_provider(sample_fs())
        .build(&ScanConfig::new("/r"))
        .unwrap();

    let root_dir = tree.nodes.children(tree.nodes.root())[0];
    assert_eq!(tree.nodes[root_dir].size, 60);
    assert!(tree.nodes.sizes_consistent());
}

#[test]
fn test_pseudo_entries_are_not_recursed() {
    let tree = TreeBuilder::with_provider(sample_fs())
        .build(&ScanConfig::new("/r"))
        .unwrap();
    // "/r", "/r/a", "/r/sub", "/r/sub/b", "/r/sub/c"
    assert_eq!(tree.nodes.descendants().count(), 5);
}

#[test]
fn test_multiple_roots_under_synthetic_root() {
    let fs = sample_fs()
        .dir("/other", vec![DirEntryInfo::file("x")])
        .file("/other/x", 7);
    let config = ScanConfig::with_roots([PathBuf::from("/r"), PathBuf::from("/other")]);
    let tree = TreeBuilder::with_provider(fs).build(&config).unwrap();

    let roots = tree.nodes.children(tree.nodes.root());
    assert_eq!(roots.len(), 2);
    for id in roots {
        assert_eq!(tree.nodes[*id].parent(), Some(tree.nodes.root()));
    }
    assert_eq!(tree.nodes[tree.nodes.root()].size, 0);
    assert_eq!(tree.total_size(), 67);
}

#[test]
fn test_unlistable_root_is_left_out() {
    let fs = sample_fs().broken("/r");
    let tree = TreeBuilder::with_provider(fs)
        .build(&ScanConfig::new("/r"))
        .unwrap();

    assert_eq!(tree.nodes.descendants().count(), 0);
    assert_eq!(tree.warnings.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_named_pipe_does_not_block_the_scan() {
    use std::sync::mpsc;
    use std::time::Duration;

    let temp = tempfile::TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.txt"), "content").unwrap();
    let status = std::process::Command::new("mkfifo")
        .arg(temp.path().join("pipe"))
        .status()
        .unwrap();
    assert!(status.success());

    let root = temp.path().to_path_buf();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(TreeBuilder::new().build(&ScanConfig::new(root)));
    });

    let tree = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("scan blocked on a named pipe")
        .unwrap();
    assert_eq!(tree.stats.total_files, 1);
    assert_eq!(tree.stats.skipped_special, 1);
    assert!(tree.warnings.is_empty());
}
