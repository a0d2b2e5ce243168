//! Core types for dirscope.
//!
//! This crate provides the in-memory tree built by a scan and shared by
//! every analysis: an arena of directory and file nodes with parent
//! handles, live size rollup, scan configuration, and error types.

mod config;
mod error;
mod format;
mod node;
mod tree;

pub use config::{IgnoreMatcher, ScanConfig, ScanConfigBuilder};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use format::{format_size, shorten_path};
pub use node::{ContentHash, DirId, DirectoryNode, ExtensionKey, FileId, FileNode, Timestamps};
pub use tree::{FileTree, InvariantViolation};
