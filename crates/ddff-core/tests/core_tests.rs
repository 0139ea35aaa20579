use ddff_core::{
    ContentHash, FileTree, HashSlot, NodeKind, NodeTree, ScanConfig, ScanError, TreeStats,
    separator_terminated,
};
use std::path::{MAIN_SEPARATOR, PathBuf};
use std::time::Duration;

fn two_level_tree() -> NodeTree {
    let mut tree = NodeTree::new();
    let root = tree.root();

    let top = tree.allocate(root, NodeKind::Directory, PathBuf::from("/top"), 0);
    let sub = tree.allocate(top, NodeKind::Directory, PathBuf::from("/top/sub"), 0);
    for (name, size) in [("x", 3u64), ("y", 4)] {
        let f = tree.allocate(sub, NodeKind::File, PathBuf::from("/top/sub").join(name), size);
        tree.attach(f);
    }
    tree.attach(sub);
    let f = tree.allocate(top, NodeKind::File, PathBuf::from("/top/z"), 100);
    tree.attach(f);
    tree.attach(top);
    tree
}

#[test]
fn test_content_hash_ordering_follows_hex() {
    let low = ContentHash::from_digest(&[0x0a, 0xff]);
    let high = ContentHash::from_digest(&[0x0b, 0x00]);
    assert!(low < high);
    assert!(low.as_str() < high.as_str());
}

#[test]
fn test_content_hash_serde_is_plain_string() {
    let hash = ContentHash::from_digest(&[0xde, 0xad]);
    let json = serde_json::to_string(&hash).unwrap();
    assert_eq!(json, "\"dead\"");
    assert_eq!(serde_json::from_str::<ContentHash>(&json).unwrap(), hash);

    let slot = HashSlot::Ready(hash.clone());
    assert_eq!(slot.hash(), Some(&hash));
}

#[test]
fn test_nested_sizes_aggregate() {
    let tree = two_level_tree();
    let top = tree.children(tree.root())[0];
    assert_eq!(tree[top].size, 107);
    assert!(tree.sizes_consistent());
}

#[test]
fn test_parent_links() {
    let tree = two_level_tree();
    for id in tree.descendants() {
        let parent = tree[id].parent().expect("every reachable node has a parent");
        assert!(tree.children(parent).contains(&id));
    }
}

#[test]
fn test_node_names() {
    let tree = two_level_tree();
    let names: Vec<String> = tree.descendants().map(|id| tree[id].full_name()).collect();
    let sep = MAIN_SEPARATOR;
    assert_eq!(names[0], format!("/top{sep}"));
    assert_eq!(names[1], format!("/top/sub{sep}"));
    assert_eq!(names[2], format!("/top/sub{sep}x"));
    assert_eq!(names[4], format!("/top{sep}z"));
}

#[test]
fn test_separator_terminated_is_idempotent() {
    let once = separator_terminated(&PathBuf::from("/a/b"));
    let twice = separator_terminated(&PathBuf::from(once.as_str()));
    assert_eq!(once, twice);
}

#[test]
fn test_file_tree_totals() {
    let tree = FileTree::new(
        two_level_tree(),
        vec![PathBuf::from("/top")],
        ScanConfig::new("/top"),
        TreeStats::default(),
        Duration::from_millis(5),
        Vec::new(),
    );
    assert_eq!(tree.total_size(), 107);
    assert!(!tree.has_warnings());
}

#[test]
fn test_root_kind() {
    let tree = NodeTree::new();
    let root = &tree[tree.root()];
    assert_eq!(root.kind(), NodeKind::Directory);
    assert!(root.parent().is_none());
    assert_eq!(root.size, 0);
    assert_eq!(tree.descendants().count(), 0);
}

#[test]
fn test_invalid_pattern_surfaces_as_scan_error() {
    let mut config = ScanConfig::new("/x");
    config.ignore_patterns.push("a{b".to_string());
    assert!(matches!(
        config.ignore_matcher(),
        Err(ScanError::InvalidConfig { .. })
    ));
}
