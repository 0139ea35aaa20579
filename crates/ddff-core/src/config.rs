//! Scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Configuration for building the node tree.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root directories to scan. Duplicates are collapsed by the scanner.
    pub roots: Vec<PathBuf>,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Entry-name patterns to leave out (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => {
                return Err("At least one root path is required".to_string());
            }
            Some(ref roots) if roots.iter().any(|r| r.as_os_str().is_empty()) => {
                return Err("Root path cannot be empty".to_string());
            }
            Some(_) => {}
            None => return Err("Root path is required".to_string()),
        }
        if let Some(ref patterns) = self.ignore_patterns {
            compile_patterns(patterns)?;
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning one path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_roots([root.into()])
    }

    /// Create a simple config for scanning several paths.
    pub fn with_roots(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            include_hidden: true,
            ignore_patterns: Vec::new(),
        }
    }

    /// Compile the ignore patterns into a matcher.
    pub fn ignore_matcher(&self) -> Result<IgnoreMatcher, ScanError> {
        let set = compile_patterns(&self.ignore_patterns)
            .map_err(|message| ScanError::InvalidConfig { message })?;
        Ok(IgnoreMatcher {
            set,
            include_hidden: self.include_hidden,
        })
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Compiled entry filter derived from a [`ScanConfig`].
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    set: GlobSet,
    include_hidden: bool,
}

impl IgnoreMatcher {
    /// Check if an entry with this name should be left out of the tree.
    pub fn should_skip(&self, name: &str) -> bool {
        (!self.include_hidden && name.starts_with('.')) || self.set.is_match(name)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| format!("bad ignore pattern {pattern:?}: {e}"))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| e.to_string())
}
