//! Scan progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Notification emitted while a scan runs.
///
/// Events are advisory: they are dropped when nobody subscribes and a slow
/// subscriber may miss some of them.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A directory was attached to the tree.
    DirectoryVisited(PathBuf),
    /// A file was attached to the tree.
    FileVisited(PathBuf),
    /// Position of the directory just visited among its siblings.
    ///
    /// This is `(index + 1) * 100 / sibling_count` for one level of one
    /// directory, not a global completion estimate.
    LevelProgress {
        /// Directory whose subdirectories are being visited.
        parent: PathBuf,
        /// Percentage of that directory's subdirectories visited so far.
        percent: u8,
    },
    /// The scan returned.
    Finished(ScanSummary),
}

/// Totals reported when a scan ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    /// Number of files attached.
    pub files_scanned: u64,
    /// Number of directories attached, excluding the root.
    pub dirs_scanned: u64,
    /// Total bytes attached.
    pub bytes_scanned: u64,
    /// Number of entries skipped because of errors.
    pub errors_count: u64,
    /// Whether the scan stopped early.
    pub cancelled: bool,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanSummary {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

/// Rank of a subdirectory among the subdirectories of its parent.
///
/// Filled in by the read-dir hook so the consumer can report per-level
/// progress without re-listing the parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiblingRank {
    pub index: usize,
    pub count: usize,
}

impl SiblingRank {
    /// Per-level percentage, or `None` for entries that are not ranked.
    pub fn percent(&self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        Some(((self.index + 1) * 100 / self.count) as u8)
    }
}
