//! Turning surviving nodes into reportable results.
//!
//! Runs after the elimination pipeline. The fuzzy pass goes first so that
//! the files it reports are not repeated by the exact pass.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::debug;

use ddff_core::{ContentHash, NodeId, NodeTree};

use crate::error::InvariantViolation;
use crate::hasher::Hasher;
use crate::report::{DuplicateResult, ExactGroup, FuzzyDirGroup};

/// Full-hash buckets of candidate nodes (no uniqueness flag set) that carry
/// a full hash. `files_only` restricts the buckets to files.
fn candidate_buckets(tree: &NodeTree, files_only: bool) -> BTreeMap<ContentHash, Vec<NodeId>> {
    let mut buckets: BTreeMap<ContentHash, Vec<NodeId>> = BTreeMap::new();
    for id in tree.descendants() {
        let node = &tree[id];
        if !node.is_candidate() || (files_only && node.is_dir()) {
            continue;
        }
        if let Some(hash) = node.full_hash.hash() {
            buckets.entry(hash.clone()).or_default().push(id);
        }
    }
    buckets
}

/// Running totals of one directory group.
#[derive(Default)]
struct DirGroup {
    directories: BTreeSet<String>,
    files: BTreeSet<String>,
    members: BTreeSet<NodeId>,
    size: u64,
}

/// Pass A: directories sharing several identical files.
///
/// Identical files spread over the same set of directories are pooled. A
/// pool whose distinct file names outnumber `min_shared_files` becomes a
/// [`FuzzyDirGroup`], and its files are marked as reported.
pub fn fuzzy_directory_groups(
    tree: &mut NodeTree,
    hasher: &dyn Hasher,
    min_shared_files: usize,
) -> Vec<DuplicateResult> {
    let buckets = candidate_buckets(tree, true);
    let mut groups: BTreeMap<ContentHash, DirGroup> = BTreeMap::new();

    for bucket in buckets.values() {
        let directories: BTreeSet<&str> = bucket.iter().map(|id| tree[*id].dir_path()).collect();
        if directories.len() == 1 {
            // copies inside one directory
            continue;
        }

        let key: Vec<&str> = directories.iter().copied().collect();
        let group = groups.entry(hasher.digest_strings(&key)).or_default();

        group
            .directories
            .extend(directories.iter().map(|d| d.to_string()));
        group
            .files
            .extend(bucket.iter().map(|id| tree[*id].file_name().to_string()));
        group.members.extend(bucket.iter().copied());
        group.size += bucket.iter().map(|id| tree[*id].size).sum::<u64>();
    }

    let mut results = Vec::new();
    for group in groups.into_values() {
        if group.files.len() <= min_shared_files || group.size == 0 {
            continue;
        }
        for id in &group.members {
            tree[*id].mark_reported();
        }
        debug!(
            directories = group.directories.len(),
            files = group.files.len(),
            "fuzzy directory group"
        );
        results.push(DuplicateResult::FuzzyDirs(FuzzyDirGroup {
            directories: group.directories,
            files: group.files,
            size: group.size,
        }));
    }
    results
}

/// Pass B: sets of identical files or directories.
///
/// Buckets left with a single member are dropped, and so are members the
/// fuzzy pass already reported. Every bucket must agree on size.
pub fn exact_groups(tree: &NodeTree) -> Result<Vec<DuplicateResult>, InvariantViolation> {
    let mut by_size: BTreeMap<u64, Vec<Vec<NodeId>>> = BTreeMap::new();

    for bucket in candidate_buckets(tree, false).into_values() {
        if bucket.len() < 2 {
            continue;
        }
        let size = common_size(tree, &bucket)?;
        by_size.entry(size).or_default().push(bucket);
    }

    let mut results = Vec::new();
    for (size, buckets) in by_size {
        for bucket in buckets {
            let full_paths: BTreeSet<String> = bucket
                .iter()
                .filter(|id| !tree[**id].is_already_reported())
                .map(|id| tree[*id].full_name())
                .collect();

            if full_paths.len() > 1 && size > 0 {
                results.push(DuplicateResult::Exact(ExactGroup {
                    is_dir: tree[bucket[0]].is_dir(),
                    size,
                    full_paths,
                }));
            }
        }
    }
    Ok(results)
}

/// The size shared by every member of a full-hash bucket.
fn common_size(tree: &NodeTree, bucket: &[NodeId]) -> Result<u64, InvariantViolation> {
    let sizes: Vec<u64> = bucket.iter().map(|id| tree[*id].size).collect();
    match sizes.iter().copied().all_equal_value() {
        Ok(size) => Ok(size),
        Err(_) => Err(InvariantViolation::SizeMismatchInBucket {
            paths: bucket.iter().map(|id| tree[*id].full_name()).collect(),
            sizes,
        }),
    }
}
