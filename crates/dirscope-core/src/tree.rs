//! Arena-backed file tree with live size rollup.
//!
//! Directories and files live in two flat vectors owned by [`FileTree`].
//! Nodes refer to each other through [`DirId`] / [`FileId`] handles: a
//! directory lists its children, a child records its parent. The parent
//! handle is only used to walk upward when a size changes.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ScanWarning;
use crate::node::{ContentHash, DirId, DirectoryNode, FileId, FileNode};

/// A directory whose derived values disagree with its children.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} mismatch at {path}: stored {stored}, children sum to {expected}")]
pub struct InvariantViolation {
    pub path: PathBuf,
    pub field: &'static str,
    pub stored: u64,
    pub expected: u64,
}

/// Complete scanned file tree with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree {
    dirs: Vec<DirectoryNode>,
    files: Vec<FileNode>,

    /// Root path that was scanned.
    pub root_path: PathBuf,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Entries skipped during the scan.
    pub warnings: Vec<ScanWarning>,

    /// Whether the scan stopped early. The tree is then a valid prefix of
    /// the full tree.
    pub cancelled: bool,
}

impl FileTree {
    /// Create a tree holding only `root`.
    pub fn new(root: DirectoryNode) -> Self {
        let root_path = root.path().to_path_buf();
        Self {
            dirs: vec![root],
            files: Vec::new(),
            root_path,
            scanned_at: SystemTime::now(),
            scan_duration: Duration::ZERO,
            warnings: Vec::new(),
            cancelled: false,
        }
    }

    /// Handle of the root directory.
    pub fn root_id(&self) -> DirId {
        DirId::new(0)
    }

    /// The root directory.
    pub fn root(&self) -> &DirectoryNode {
        &self.dirs[0]
    }

    /// Get a directory by handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    pub fn dir(&self, id: DirId) -> &DirectoryNode {
        &self.dirs[id.index()]
    }

    /// Get a file by handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    pub fn file(&self, id: FileId) -> &FileNode {
        &self.files[id.index()]
    }

    /// Iterate over all directories in insertion order.
    pub fn directories(&self) -> impl Iterator<Item = (DirId, &DirectoryNode)> {
        self.dirs
            .iter()
            .enumerate()
            .map(|(i, d)| (DirId::new(i as u32), d))
    }

    /// Iterate over all files in insertion order.
    pub fn files(&self) -> impl Iterator<Item = (FileId, &FileNode)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId::new(i as u32), f))
    }

    /// Attach a file to `parent` and roll its size up to the root.
    pub fn add_file(&mut self, parent: DirId, mut file: FileNode) -> FileId {
        let id = FileId::new(self.files.len() as u32);
        let size = file.size();
        file.attach(parent);
        self.files.push(file);
        self.dirs[parent.index()].files.push(id);
        self.propagate(parent, size, 1, 0);
        id
    }

    /// Attach an empty directory to `parent`.
    pub fn add_directory(&mut self, parent: DirId, mut dir: DirectoryNode) -> DirId {
        debug_assert!(dir.is_empty(), "only empty directories can be attached");
        let id = DirId::new(self.dirs.len() as u32);
        dir.attach(parent);
        self.dirs.push(dir);
        self.dirs[parent.index()].subdirectories.push(id);
        self.propagate(parent, 0, 0, 1);
        id
    }

    /// Add deltas to `from` and every ancestor up to the root.
    fn propagate(&mut self, from: DirId, bytes: u64, files: u64, dirs: u64) {
        let mut current = Some(from);
        while let Some(id) = current {
            let dir = &mut self.dirs[id.index()];
            dir.size += bytes;
            dir.file_count += files;
            dir.dir_count += dirs;
            current = dir.parent();
        }
    }

    /// Recompute every derived value bottom-up from the leaves.
    ///
    /// Children are always stored after their parent, so a reverse pass
    /// sees each subdirectory before the directory that owns it.
    pub fn recompute_sizes(&mut self) {
        for i in (0..self.dirs.len()).rev() {
            let (size, file_count, dir_count) = self.sum_children(&self.dirs[i]);
            let dir = &mut self.dirs[i];
            dir.size = size;
            dir.file_count = file_count;
            dir.dir_count = dir_count;
        }
    }

    fn sum_children(&self, dir: &DirectoryNode) -> (u64, u64, u64) {
        let mut size: u64 = dir.files.iter().map(|f| self.files[f.index()].size()).sum();
        let mut file_count = dir.files.len() as u64;
        let mut dir_count = dir.subdirectories.len() as u64;
        for sub in &dir.subdirectories {
            let sub = &self.dirs[sub.index()];
            size += sub.size;
            file_count += sub.file_count;
            dir_count += sub.dir_count;
        }
        (size, file_count, dir_count)
    }

    /// Check the size and count laws on every directory.
    pub fn verify_invariants(&self) -> Result<(), InvariantViolation> {
        for dir in &self.dirs {
            let (size, file_count, dir_count) = self.sum_children(dir);
            for (field, stored, expected) in [
                ("size", dir.size, size),
                ("file_count", dir.file_count, file_count),
                ("dir_count", dir.dir_count, dir_count),
            ] {
                if stored != expected {
                    return Err(InvariantViolation {
                        path: dir.path().to_path_buf(),
                        field,
                        stored,
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    /// Record (or clear) the content hash of a file.
    pub fn set_content_hash(&mut self, id: FileId, hash: Option<ContentHash>) {
        self.files[id.index()].set_content_hash(hash);
    }

    /// Set the duplicate flag of a file.
    pub fn set_duplicate(&mut self, id: FileId, duplicate: bool) {
        self.files[id.index()].set_duplicate(duplicate);
    }

    /// Clear the duplicate flag on every file.
    pub fn clear_duplicate_flags(&mut self) {
        for file in &mut self.files {
            file.set_duplicate(false);
        }
    }

    /// Total number of files below `id`.
    pub fn total_file_count(&self, id: DirId) -> u64 {
        self.dir(id).file_count()
    }

    /// Total number of directories below `id`.
    pub fn total_dir_count(&self, id: DirId) -> u64 {
        self.dir(id).dir_count()
    }

    /// Files below `from` in traversal order: a directory's own files
    /// first, then each subdirectory depth-first, all in enumeration order.
    pub fn files_in_order(&self, from: DirId) -> Vec<FileId> {
        let mut out = Vec::with_capacity(self.dir(from).file_count() as usize);
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let dir = self.dir(id);
            out.extend_from_slice(&dir.files);
            stack.extend(dir.subdirectories.iter().rev());
        }
        out
    }

    /// Directories below and including `from`, depth-first pre-order.
    pub fn dirs_in_order(&self, from: DirId) -> Vec<DirId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.dir(id).subdirectories.iter().rev());
        }
        out
    }

    /// Find a direct subdirectory of `parent` by name.
    pub fn subdirectory_named(&self, parent: DirId, name: &str) -> Option<DirId> {
        self.dir(parent)
            .subdirectories()
            .iter()
            .copied()
            .find(|id| self.dir(*id).name() == name)
    }

    /// Find a direct file of `parent` by name.
    pub fn file_named(&self, parent: DirId, name: &str) -> Option<FileId> {
        self.dir(parent)
            .files()
            .iter()
            .copied()
            .find(|id| self.file(*id).name() == name)
    }

    /// Find a file anywhere in the tree by absolute path.
    pub fn file_by_path(&self, path: &Path) -> Option<FileId> {
        self.files().find(|(_, f)| f.path() == path).map(|(id, _)| id)
    }

    /// Get the total size of the tree.
    pub fn total_size(&self) -> u64 {
        self.root().size()
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.root().file_count()
    }

    /// Get the total number of directories, excluding the root.
    pub fn total_dirs(&self) -> u64 {
        self.root().dir_count()
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
