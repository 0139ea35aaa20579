//! Tree builder for ddff.
//!
//! This crate walks one or more root directories and builds the node arena
//! the elimination pipeline works on.
//!
//! # Overview
//!
//! - **Depth-first, single-threaded** traversal with blocking I/O
//! - **Pluggable file system** through [`FileSystemProvider`]
//! - **Unreadable entries are left out**, recorded as warnings
//! - **Symbolic links are never followed**
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use ddff_scan::{ScanConfig, TreeBuilder};
//!
//! let config = ScanConfig::with_roots([PathBuf::from("/data"), PathBuf::from("/backup")]);
//! let tree = TreeBuilder::new().build(&config).unwrap();
//!
//! println!("Total size: {} bytes", tree.total_size());
//! println!("Total files: {}", tree.total_files());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use ddff_scan::{ScanConfig, TreeBuilder};
//!
//! let builder = TreeBuilder::new();
//! let mut progress_rx = builder.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         eprintln!("Scanned {} files", progress.files);
//!     }
//! });
//! ```

mod progress;
mod provider;
mod scanner;

pub use progress::ScanProgress;
pub use provider::{DirEntryInfo, FileSystemProvider, LocalFileSystem};
pub use scanner::TreeBuilder;

// Re-export core types for convenience
pub use ddff_core::{
    FileTree, Node, NodeId, NodeKind, NodeTree, ScanConfig, ScanError, ScanWarning, TreeStats,
    WarningKind,
};
