//! Duplicate results and their serialization.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineStats;

/// Files or directories with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactGroup {
    pub is_dir: bool,
    /// Size of each member in bytes.
    pub size: u64,
    /// Full names of the members. Directory names end with a separator.
    pub full_paths: BTreeSet<String>,
}

/// Directories that share several identical files without being identical
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyDirGroup {
    pub directories: BTreeSet<String>,
    /// Names of the shared files.
    pub files: BTreeSet<String>,
    /// Combined size of every shared file in every directory.
    pub size: u64,
}

/// A reportable outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateResult {
    Exact(ExactGroup),
    FuzzyDirs(FuzzyDirGroup),
}

impl DuplicateResult {
    /// Size the result is ordered by.
    pub fn size(&self) -> u64 {
        match self {
            DuplicateResult::Exact(group) => group.size,
            DuplicateResult::FuzzyDirs(group) => group.size,
        }
    }

    /// Write the text block for this result.
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            DuplicateResult::FuzzyDirs(group) => {
                writeln!(
                    out,
                    "* common files in directories ({})",
                    format_size_approx(group.size)
                )?;
                writeln!(out, "** directories:")?;
                for dir in &group.directories {
                    writeln!(out, "{dir}")?;
                }
                writeln!(out, "** files:")?;
                for file in &group.files {
                    writeln!(out, "{file}")?;
                }
            }
            DuplicateResult::Exact(group) => {
                let what = if group.is_dir { "directories" } else { "files" };
                writeln!(
                    out,
                    "* equal {what} (size {})",
                    format_size_approx(group.size)
                )?;
                for path in &group.full_paths {
                    writeln!(out, "{path}")?;
                }
            }
        }
        writeln!(out)
    }

    /// Compact JSON of the result, used to order results of equal size.
    fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Results of a duplicate analysis, largest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// Results by size descending; equal sizes ordered by their canonical
    /// JSON form.
    pub results: Vec<DuplicateResult>,
    /// Counters from the elimination pipeline.
    pub stats: PipelineStats,
}

impl DuplicateReport {
    /// Build a report, ordering `results`.
    pub fn new(mut results: Vec<DuplicateResult>, stats: PipelineStats) -> Self {
        results.sort_by_cached_key(|r| (Reverse(r.size()), r.canonical_key()));
        Self { results, stats }
    }

    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn exact_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, DuplicateResult::Exact(_)))
            .count()
    }

    pub fn fuzzy_count(&self) -> usize {
        self.results.len() - self.exact_count()
    }

    /// Bytes that could be reclaimed by keeping one member of every exact
    /// group.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.results
            .iter()
            .filter_map(|r| match r {
                DuplicateResult::Exact(g) => {
                    Some(g.size * g.full_paths.len().saturating_sub(1) as u64)
                }
                DuplicateResult::FuzzyDirs(_) => None,
            })
            .sum()
    }

    /// Write the plain-text report.
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "* results:")?;
        for result in &self.results {
            result.write_text(out)?;
        }
        Ok(())
    }

    /// Write the report as pretty JSON.
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}

/// Approximate decimal size as used in the text report: `~3G`, `~12M`,
/// `~4k`, or the exact byte count up to 1000.
pub fn format_size_approx(bytes: u64) -> String {
    if bytes > 1_000_000_000 {
        format!("~{}G", bytes / 1_000_000_000)
    } else if bytes > 1_000_000 {
        format!("~{}M", bytes / 1_000_000)
    } else if bytes > 1000 {
        format!("~{}k", bytes / 1000)
    } else {
        bytes.to_string()
    }
}
