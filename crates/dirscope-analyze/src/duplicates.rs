//! Duplicate file detection using content hashing.
//!
//! Every file is hashed with BLAKE3 and grouped by digest. Within a group
//! the file met first in traversal order (a directory's files before its
//! subdirectories, enumeration order) is the original; every later member
//! is flagged as a duplicate.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use blake3::Hasher;
use derive_builder::Builder;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dirscope_core::{ContentHash, DirId, FileId, FileTree};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for duplicate detection.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct DuplicateConfig {
    /// Minimum file size to consider. Smaller files are not hashed.
    #[builder(default = "0")]
    #[serde(default)]
    pub min_size: u64,

    /// Compare group members byte for byte against the original before
    /// flagging them.
    #[builder(default = "false")]
    #[serde(default)]
    pub verify_contents: bool,

    /// Hash files on the rayon pool instead of the calling thread.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            verify_contents: false,
            parallel: true,
        }
    }
}

impl DuplicateConfig {
    /// Create a new config builder.
    pub fn builder() -> DuplicateConfigBuilder {
        DuplicateConfigBuilder::default()
    }
}

/// Files sharing one digest, in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Content hash shared by all files in this group.
    pub hash: ContentHash,

    /// Size of each file in bytes.
    pub size: u64,

    /// Members; the first one is the original.
    pub files: Vec<FileId>,
}

impl DuplicateGroup {
    /// The file every other member duplicates.
    pub fn original(&self) -> FileId {
        self.files[0]
    }

    /// Members flagged as duplicates.
    pub fn duplicates(&self) -> &[FileId] {
        &self.files[1..]
    }

    /// Get the number of files in the group.
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Space that deleting the duplicates would reclaim.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * self.duplicates().len() as u64
    }
}

/// A file left out of the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Results from duplicate analysis.
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// Groups with at least two members, keyed by digest, in the order
    /// their originals were met.
    pub groups: IndexMap<ContentHash, DuplicateGroup>,

    /// Outcome for every file that was processed; `None` when hashing
    /// failed.
    pub hashes: Vec<(FileId, Option<ContentHash>)>,

    /// Files skipped because they could not be read.
    pub warnings: Vec<HashWarning>,

    /// Number of files hashed successfully.
    pub files_analyzed: u64,

    /// Whether the run stopped early.
    pub cancelled: bool,
}

impl DuplicateReport {
    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Get the number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Get total number of files across all groups, originals included.
    pub fn files_with_duplicates(&self) -> usize {
        self.groups.values().map(|g| g.count()).sum()
    }

    /// Total space that deleting every duplicate would reclaim.
    pub fn total_wasted_space(&self) -> u64 {
        self.groups.values().map(|g| g.wasted_bytes()).sum()
    }

    /// Group containing `file`, if any.
    pub fn group_of(&self, file: FileId) -> Option<&DuplicateGroup> {
        self.groups.values().find(|g| g.files.contains(&file))
    }

    /// Write hashes and duplicate flags into the tree the report was built
    /// from.
    ///
    /// Duplicate flags are reset first, so applying a fresh report after an
    /// earlier one leaves no stale flags behind. Files the run never reached
    /// keep whatever hash they had.
    pub fn apply(&self, tree: &mut FileTree) {
        tree.clear_duplicate_flags();
        for (id, hash) in &self.hashes {
            tree.set_content_hash(*id, *hash);
        }
        for group in self.groups.values() {
            for id in group.duplicates() {
                tree.set_duplicate(*id, true);
            }
        }
    }
}

/// Notification emitted during duplicate detection.
#[derive(Debug, Clone, PartialEq)]
pub enum HashEvent {
    /// A file was hashed.
    FileHashed(PathBuf),
    /// Share of queued files processed so far.
    Progress { percent: u8 },
    /// A duplicate was confirmed.
    DuplicateFound { original: PathBuf, duplicate: PathBuf },
}

enum Outcome {
    Hashed(ContentHash),
    Failed(io::Error),
    Skipped,
}

/// Duplicate file finder.
pub struct DuplicateFinder {
    config: DuplicateConfig,
    events_tx: broadcast::Sender<HashEvent>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with default config.
    pub fn new() -> Self {
        Self::with_config(DuplicateConfig::default())
    }

    /// Create a new duplicate finder with custom config.
    pub fn with_config(config: DuplicateConfig) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            config,
            events_tx,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Subscribe to hashing events.
    pub fn subscribe(&self) -> broadcast::Receiver<HashEvent> {
        self.events_tx.subscribe()
    }

    /// Whether an analysis is currently in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the analysis in progress to stop.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Find duplicates and annotate the tree with hashes and flags.
    pub fn find_duplicates(&self, tree: &mut FileTree) -> DuplicateReport {
        self.find_duplicates_with_cancel(tree, CancellationToken::new())
    }

    /// Like [`find_duplicates`](Self::find_duplicates), stopping early once
    /// `cancel` fires. Work done before that is kept.
    pub fn find_duplicates_with_cancel(
        &self,
        tree: &mut FileTree,
        cancel: CancellationToken,
    ) -> DuplicateReport {
        let report = self.analyze(tree, cancel);
        report.apply(tree);
        report
    }

    /// Hash and group the files of `tree` without modifying it.
    pub fn analyze(&self, tree: &FileTree, cancel: CancellationToken) -> DuplicateReport {
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        let _running = RunningGuard::set(&self.running);

        let mut report = DuplicateReport::default();
        let candidates = self.collect_files(tree, tree.root_id(), &cancel, &mut report.cancelled);
        debug!(candidates = candidates.len(), "hashing files");

        let outcomes = self.hash_all(tree, &candidates, &cancel);

        let mut by_hash: IndexMap<ContentHash, Vec<FileId>> = IndexMap::new();
        for (&id, outcome) in candidates.iter().zip(outcomes) {
            match outcome {
                Outcome::Hashed(hash) => {
                    report.hashes.push((id, Some(hash)));
                    report.files_analyzed += 1;
                    by_hash.entry(hash).or_default().push(id);
                }
                Outcome::Failed(err) => {
                    let path = tree.file(id).path();
                    warn!(path = %path.display(), "cannot hash file: {err}");
                    report.hashes.push((id, None));
                    report.warnings.push(HashWarning {
                        path: path.to_path_buf(),
                        message: err.to_string(),
                    });
                }
                Outcome::Skipped => report.cancelled = true,
            }
        }

        for (hash, mut files) in by_hash {
            if files.len() < 2 {
                continue;
            }
            if self.config.verify_contents {
                files = self.confirm_members(tree, files, &mut report.warnings);
                if files.len() < 2 {
                    continue;
                }
            }
            let size = tree.file(files[0]).size();
            report.groups.insert(hash, DuplicateGroup { hash, size, files });
        }

        self.report_duplicates(tree, &report);

        info!(
            files = report.files_analyzed,
            groups = report.group_count(),
            wasted = report.total_wasted_space(),
            cancelled = report.cancelled,
            "duplicate analysis finished"
        );
        report
    }

    /// Collect candidate files in traversal order.
    fn collect_files(
        &self,
        tree: &FileTree,
        dir: DirId,
        cancel: &CancellationToken,
        cancelled: &mut bool,
    ) -> Vec<FileId> {
        let mut files = Vec::new();
        let mut stack = vec![dir];
        while let Some(id) = stack.pop() {
            if cancel.is_cancelled() {
                *cancelled = true;
                break;
            }
            let node = tree.dir(id);
            files.extend(
                node.files()
                    .iter()
                    .copied()
                    .filter(|f| tree.file(*f).size() >= self.config.min_size),
            );
            stack.extend(node.subdirectories().iter().rev());
        }
        files
    }

    /// Hash every candidate. Output order matches input order.
    fn hash_all(
        &self,
        tree: &FileTree,
        candidates: &[FileId],
        cancel: &CancellationToken,
    ) -> Vec<Outcome> {
        let total = candidates.len() as u64;
        let processed = AtomicU64::new(0);
        let hash_one = |id: &FileId| -> Outcome {
            if cancel.is_cancelled() {
                return Outcome::Skipped;
            }
            let path = tree.file(*id).path();
            let outcome = match compute_full_hash(path) {
                Ok(hash) => {
                    self.emit(|| HashEvent::FileHashed(path.to_path_buf()));
                    Outcome::Hashed(hash)
                }
                Err(err) => Outcome::Failed(err),
            };
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            self.emit(|| HashEvent::Progress {
                percent: (done * 100 / total) as u8,
            });
            outcome
        };

        if self.config.parallel {
            candidates.par_iter().map(hash_one).collect()
        } else {
            candidates.iter().map(hash_one).collect()
        }
    }

    /// Keep only members whose bytes equal the original's.
    fn confirm_members(
        &self,
        tree: &FileTree,
        files: Vec<FileId>,
        warnings: &mut Vec<HashWarning>,
    ) -> Vec<FileId> {
        let original = tree.file(files[0]).path();
        let mut kept = vec![files[0]];
        for &id in &files[1..] {
            let path = tree.file(id).path();
            match same_contents(original, path) {
                Ok(true) => kept.push(id),
                Ok(false) => {
                    warn!(path = %path.display(), "digest collision with {}", original.display());
                    warnings.push(HashWarning {
                        path: path.to_path_buf(),
                        message: format!("same digest as {} but different bytes", original.display()),
                    });
                }
                Err(err) => {
                    warn!(path = %path.display(), "cannot verify contents: {err}");
                    warnings.push(HashWarning {
                        path: path.to_path_buf(),
                        message: err.to_string(),
                    });
                }
            }
        }
        kept
    }

    fn report_duplicates(&self, tree: &FileTree, report: &DuplicateReport) {
        if self.events_tx.receiver_count() == 0 {
            return;
        }
        for group in report.groups.values() {
            let original = tree.file(group.original()).path();
            for id in group.duplicates() {
                let _ = self.events_tx.send(HashEvent::DuplicateFound {
                    original: original.to_path_buf(),
                    duplicate: tree.file(*id).path().to_path_buf(),
                });
            }
        }
    }

    fn emit(&self, event: impl FnOnce() -> HashEvent) {
        if self.events_tx.receiver_count() > 0 {
            let _ = self.events_tx.send(event());
        }
    }
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the running flag set until the analysis returns or unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Compute the BLAKE3 hash of a file's full contents.
pub fn compute_full_hash(path: &Path) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Byte-for-byte comparison of two files.
fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    let mut fa = File::open(a)?;
    let mut fb = File::open(b)?;
    if fa.metadata()?.len() != fb.metadata()?.len() {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; READ_BUFFER_SIZE];
    let mut buf_b = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = read_full(&mut fa, &mut buf_a)?;
        let m = read_full(&mut fb, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the file allows.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
