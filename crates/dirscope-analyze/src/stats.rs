//! Size and extension statistics over a scanned tree.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use dirscope_core::{ExtensionKey, FileId, FileTree};

/// Number of files returned by [`largest_files`] when the caller has no
/// preference.
pub const DEFAULT_LARGEST: usize = 10;

/// Size share of one directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirSizeEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Percentage of the root's size, rounded to two decimals.
    pub percentage: f64,
    pub file_count: u64,
}

/// Size breakdown of the root and its immediate subdirectories.
///
/// The root comes first at 100%, followed by each subdirectory; the list
/// is ordered by size descending and ties keep enumeration order. An empty
/// root (size 0) yields an empty list.
pub fn size_statistics(tree: &FileTree) -> Vec<DirSizeEntry> {
    let root = tree.root();
    if root.size() == 0 {
        return Vec::new();
    }

    let total = root.size() as f64;
    let entry = |id| {
        let dir = tree.dir(id);
        DirSizeEntry {
            name: dir.name().to_string(),
            path: dir.path().to_path_buf(),
            size: dir.size(),
            percentage: round2(dir.size() as f64 / total * 100.0),
            file_count: dir.file_count(),
        }
    };

    let mut entries = Vec::with_capacity(root.subdirectories().len() + 1);
    entries.push(DirSizeEntry {
        percentage: 100.0,
        ..entry(tree.root_id())
    });
    entries.extend(root.subdirectories().iter().map(|&id| entry(id)));
    entries.sort_by(|a, b| b.size.cmp(&a.size));
    entries
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The `max_count` largest files, biggest first.
///
/// Files of equal size keep traversal order.
pub fn largest_files(tree: &FileTree, max_count: usize) -> Vec<FileId> {
    if max_count == 0 {
        return Vec::new();
    }
    let mut files = tree.files_in_order(tree.root_id());
    files.sort_by(|a, b| tree.file(*b).size().cmp(&tree.file(*a).size()));
    files.truncate(max_count);
    files
}

/// Total bytes per file extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionStats {
    totals: HashMap<ExtensionKey, u64>,
}

impl ExtensionStats {
    /// Bytes recorded for `key`.
    pub fn get(&self, key: &ExtensionKey) -> Option<u64> {
        self.totals.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExtensionKey, u64)> {
        self.totals.iter().map(|(k, v)| (k, *v))
    }

    /// Entries ordered by bytes descending, then by key.
    pub fn sorted(&self) -> Vec<(ExtensionKey, u64)> {
        let mut entries: Vec<_> = self.totals.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    /// Sum over all extensions; equals the root size.
    pub fn total_bytes(&self) -> u64 {
        self.totals.values().sum()
    }
}

/// Total bytes per lowercase extension across the whole tree.
///
/// Files without an extension are grouped under
/// [`ExtensionKey::NoExtension`].
pub fn extension_statistics(tree: &FileTree) -> ExtensionStats {
    let mut totals: HashMap<ExtensionKey, u64> = HashMap::new();
    for (_, file) in tree.files() {
        *totals.entry(file.extension_key()).or_insert(0) += file.size();
    }
    ExtensionStats { totals }
}
