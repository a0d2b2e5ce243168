//! Analysis algorithms for dirscope.
//!
//! This crate works on a [`FileTree`] built by `dirscope-scan`:
//!
//! - **Duplicate detection**: BLAKE3 content hashes grouped by digest, the
//!   first file met in traversal order being the original
//! - **Size statistics**: share of each top-level directory, largest files
//! - **Extension statistics**: total bytes per lowercase extension
//! - **Search**: wildcard matching on file names
//!
//! Everything except [`DuplicateReport::apply`] takes the tree by shared
//! reference, so statistics can be computed while hashing runs.
//!
//! ```rust,no_run
//! use dirscope_analyze::{DuplicateFinder, largest_files, DEFAULT_LARGEST};
//! use dirscope_scan::{Scanner, ScanConfig};
//!
//! let mut tree = Scanner::new().scan(&ScanConfig::new("/path/to/scan")).unwrap();
//!
//! let report = DuplicateFinder::new().find_duplicates(&mut tree);
//! println!("Found {} duplicate groups", report.group_count());
//! println!("Wasted space: {} bytes", report.total_wasted_space());
//!
//! for id in largest_files(&tree, DEFAULT_LARGEST) {
//!     println!("{}", tree.file(id));
//! }
//! ```

mod duplicates;
mod error;
pub mod search;
mod stats;

pub use duplicates::{
    DuplicateConfig, DuplicateConfigBuilder, DuplicateFinder, DuplicateGroup, DuplicateReport,
    HashEvent, HashWarning, compute_full_hash,
};
pub use error::{AnalyzeError, AnalyzeResult};
pub use search::{NamePattern, find_by_pattern};
pub use stats::{
    DEFAULT_LARGEST, DirSizeEntry, ExtensionStats, extension_statistics, largest_files,
    size_statistics,
};

pub use tokio_util::sync::CancellationToken;

// Re-export core types
pub use dirscope_core::{ContentHash, ExtensionKey, FileId, FileNode, FileTree};
