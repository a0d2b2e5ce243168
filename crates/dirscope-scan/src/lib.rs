//! Directory tree builder for dirscope.
//!
//! # Overview
//!
//! `dirscope-scan` walks a directory and builds the in-memory
//! [`FileTree`]. Key features:
//!
//! - **Parallel directory reads** via jwalk/rayon, with a single thread
//!   attaching nodes so size rollups never race
//! - **Deterministic order**: within a directory, files come before
//!   subdirectories, each in enumeration order
//! - **Events** via a broadcast channel (directory visited, file visited,
//!   per-level percentage)
//! - **Cooperative cancellation** returning a valid partial tree
//!
//! # Example
//!
//! ```rust,no_run
//! use dirscope_scan::{Scanner, ScanConfig};
//!
//! let config = ScanConfig::new("/path/to/scan");
//! let scanner = Scanner::new();
//! let tree = scanner.scan(&config).unwrap();
//!
//! println!("Total size: {} bytes", tree.total_size());
//! println!("Total files: {}", tree.total_files());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use dirscope_scan::{ScanEvent, Scanner};
//!
//! let scanner = Scanner::new();
//! let mut events = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let ScanEvent::FileVisited(path) = event {
//!             println!("{}", path.display());
//!         }
//!     }
//! });
//! ```

mod progress;
mod scanner;

pub use progress::{ScanEvent, ScanSummary, SiblingRank};
pub use scanner::Scanner;

pub use tokio_util::sync::CancellationToken;

// Re-export core types for convenience
pub use dirscope_core::{
    DirId, DirectoryNode, FileId, FileNode, FileTree, ScanConfig, ScanError, ScanWarning,
    Timestamps, WarningKind,
};
