//! Core types for ddff.
//!
//! This crate provides the data structures shared by the scanner and the
//! elimination pipeline: the node arena, content hashes, scan configuration
//! and error types.

mod config;
mod error;
mod node;
mod tree;

pub use config::{IgnoreMatcher, ScanConfig, ScanConfigBuilder};
pub use error::{HashError, ScanError, ScanWarning, WarningKind};
pub use node::{ContentHash, HashSlot, Node, NodeId, NodeKind, separator_terminated};
pub use tree::{Descendants, FileTree, NodeTree, TreeStats};
