//! Optional TOML settings file.
//!
//! Values here are defaults; command line flags take precedence.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use ddff_analyze::HashAlgorithm;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub algorithm: Option<HashAlgorithm>,
    pub threads: Option<usize>,
    pub partial_window: Option<usize>,
    pub fuzzy_min_shared_files: Option<usize>,
    pub include_hidden: Option<bool>,
    /// Entry-name globs added to any given with `--exclude`.
    pub ignore_patterns: Vec<String>,
    /// Set to false to disable the hash cache.
    pub cache: Option<bool>,
    pub cache_path: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Settings {
    /// `<config_dir>/ddff/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ddff").join("config.toml"))
    }

    /// `<cache_dir>/ddff/hashes.json`.
    pub fn default_cache_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("ddff").join("hashes.json"))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).wrap_err("Invalid settings file")
    }

    /// Load settings from `explicit`, which must exist, or else from the
    /// default location when a file is present there.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        debug!(path = %path.display(), "loading settings");
        let text = fs::read_to_string(&path)
            .wrap_err_with(|| format!("Cannot read settings file {}", path.display()))?;
        Self::from_toml(&text).wrap_err_with(|| format!("In {}", path.display()))
    }

    /// Whether the persisted hash cache should be used.
    pub fn cache_enabled(&self) -> bool {
        self.cache.unwrap_or(true)
    }
}
