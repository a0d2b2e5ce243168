//! File and directory node types.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::format::format_size;

/// Handle to a directory stored in a [`FileTree`](crate::FileTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirId(pub u32);

impl DirId {
    /// Create a new DirId from a raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a file stored in a [`FileTree`](crate::FileTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Create a new FileId from a raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// BLAKE3 content hash for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// File metadata timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Last modification time.
    pub modified: SystemTime,
    /// Last access time (if available).
    pub accessed: Option<SystemTime>,
    /// Creation time (if available, platform-dependent).
    pub created: Option<SystemTime>,
}

impl Timestamps {
    /// Create timestamps with only modified time.
    pub fn with_modified(modified: SystemTime) -> Self {
        Self {
            modified,
            accessed: None,
            created: None,
        }
    }

    /// Create timestamps with all available times.
    pub fn new(
        modified: SystemTime,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> Self {
        Self {
            modified,
            accessed,
            created,
        }
    }

    /// Read whatever timestamps the platform exposes.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self::new(
            metadata.modified().unwrap_or(UNIX_EPOCH),
            metadata.accessed().ok(),
            metadata.created().ok(),
        )
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::with_modified(UNIX_EPOCH)
    }
}

/// Key under which extension statistics are accumulated.
///
/// Files without an extension land in [`ExtensionKey::NoExtension`], which
/// is a separate variant and therefore never equal to a real extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtensionKey {
    /// Lower-cased extension without the leading dot.
    Named(CompactString),
    /// The file name has no extension.
    NoExtension,
}

impl ExtensionKey {
    /// Build a key from a raw, possibly mixed-case, extension.
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext {
            Some(ext) if !ext.is_empty() => Self::Named(ext.to_lowercase().into()),
            _ => Self::NoExtension,
        }
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(ext) => write!(f, ".{ext}"),
            Self::NoExtension => f.write_str("(no extension)"),
        }
    }
}

/// A regular file in the tree.
///
/// Size and timestamps are a snapshot taken when the file was scanned. The
/// content hash and duplicate flag are the only fields that change later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    name: CompactString,
    path: PathBuf,
    size: u64,
    timestamps: Timestamps,
    parent: Option<DirId>,
    content_hash: Option<ContentHash>,
    is_duplicate: bool,
}

impl FileNode {
    /// Create a detached file node. It gets a parent when added to a tree.
    pub fn new(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        size: u64,
        timestamps: Timestamps,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            timestamps,
            parent: None,
            content_hash: None,
            is_duplicate: false,
        }
    }

    /// File name (not full path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes at scan time.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    /// Directory that owns this file, once attached.
    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    /// Extension as written in the file name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        Path::new(self.name.as_str())
            .extension()
            .and_then(|e| e.to_str())
    }

    /// Extension normalized for statistics.
    pub fn extension_key(&self) -> ExtensionKey {
        ExtensionKey::from_extension(self.extension())
    }

    /// Content hash, set by duplicate detection.
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.content_hash
    }

    pub(crate) fn set_content_hash(&mut self, hash: Option<ContentHash>) {
        self.content_hash = hash;
    }

    /// Whether this file duplicates an earlier file in traversal order.
    pub fn is_duplicate(&self) -> bool {
        self.is_duplicate
    }

    pub(crate) fn set_duplicate(&mut self, duplicate: bool) {
        self.is_duplicate = duplicate;
    }

    pub(crate) fn attach(&mut self, parent: DirId) {
        debug_assert!(self.parent.is_none(), "file attached twice");
        self.parent = Some(parent);
    }
}

impl fmt::Display for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, format_size(self.size))?;
        if self.is_duplicate {
            f.write_str(" [Duplicate]")?;
        }
        Ok(())
    }
}

/// A directory in the tree.
///
/// `size`, `file_count` and `dir_count` are derived values maintained by
/// the owning [`FileTree`](crate::FileTree); they cannot be set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryNode {
    name: CompactString,
    path: PathBuf,
    timestamps: Timestamps,
    parent: Option<DirId>,
    pub(crate) files: Vec<FileId>,
    pub(crate) subdirectories: Vec<DirId>,
    pub(crate) size: u64,
    pub(crate) file_count: u64,
    pub(crate) dir_count: u64,
}

impl DirectoryNode {
    /// Create an empty, detached directory node.
    pub fn new(name: impl Into<CompactString>, path: impl Into<PathBuf>, timestamps: Timestamps) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            timestamps,
            parent: None,
            files: Vec::new(),
            subdirectories: Vec::new(),
            size: 0,
            file_count: 0,
            dir_count: 0,
        }
    }

    /// Directory name (not full path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    /// Owning directory; `None` for the root.
    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    /// Direct files in enumeration order.
    pub fn files(&self) -> &[FileId] {
        &self.files
    }

    /// Direct subdirectories in enumeration order.
    pub fn subdirectories(&self) -> &[DirId] {
        &self.subdirectories
    }

    /// Aggregate size of everything below this directory.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Total number of files in this subtree.
    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    /// Total number of directories in this subtree, excluding itself.
    pub fn dir_count(&self) -> u64 {
        self.dir_count
    }

    /// Check if the directory has no direct children.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.subdirectories.is_empty()
    }

    pub(crate) fn attach(&mut self, parent: DirId) {
        debug_assert!(self.parent.is_none(), "directory attached twice");
        self.parent = Some(parent);
    }
}

impl fmt::Display for DirectoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/ ({}, {} files, {} dirs)",
            self.name,
            format_size(self.size),
            self.file_count,
            self.dir_count
        )
    }
}
