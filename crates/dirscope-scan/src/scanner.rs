//! JWalk-based directory scanner.
//!
//! jwalk reads directories in parallel; this module consumes its ordered
//! output on the calling thread and attaches each entry to the arena as it
//! arrives. The calling thread is the only writer, so every size rollup is
//! applied exactly once and the tree is consistent after each entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use jwalk::{Parallelism, WalkDirGeneric};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dirscope_core::{
    DirId, DirectoryNode, FileNode, FileTree, IgnoreMatcher, ScanConfig, ScanError, ScanWarning,
    Timestamps, WarningKind,
};

use crate::progress::{ScanEvent, ScanSummary, SiblingRank};

/// Client state carried by jwalk: nothing per directory read, a sibling
/// rank per entry.
type WalkState = ((), SiblingRank);

/// Builds a [`FileTree`] from a directory on disk.
pub struct Scanner {
    events_tx: broadcast::Sender<ScanEvent>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl Scanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            events_tx,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Subscribe to scan events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events_tx.subscribe()
    }

    /// Whether a scan is currently in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the scan in progress to stop. It returns the partial tree.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Scan `config.root` with a fresh cancellation token.
    pub fn scan(&self, config: &ScanConfig) -> Result<FileTree, ScanError> {
        self.scan_with_cancel(config, CancellationToken::new())
    }

    /// Scan `config.root`, stopping early once `cancel` fires.
    ///
    /// Only problems with the root are errors. Entries below it that cannot
    /// be read are recorded in [`FileTree::warnings`] and skipped. A
    /// cancelled scan still returns `Ok`, with [`FileTree::cancelled`] set.
    pub fn scan_with_cancel(
        &self,
        config: &ScanConfig,
        cancel: CancellationToken,
    ) -> Result<FileTree, ScanError> {
        let start = Instant::now();
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&config.root, e))?;

        let root_metadata =
            std::fs::metadata(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
        if !root_metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }
        let matcher = config.ignore_matcher()?;

        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        let _running = RunningGuard::set(&self.running);
        debug!(root = %root_path.display(), threads = config.threads, "scan started");

        let root_name = root_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root_path.to_string_lossy().to_string());
        let root = DirectoryNode::new(
            root_name,
            &root_path,
            Timestamps::from_metadata(&root_metadata),
        );

        let mut builder = TreeBuilder::new(FileTree::new(root), &self.events_tx);
        builder.run(config, &root_path, matcher, &cancel);

        let mut tree = builder.finish();
        tree.scan_duration = start.elapsed();
        self.report_finished(&tree);

        if tree.cancelled {
            info!(files = tree.total_files(), "scan cancelled, returning partial tree");
        } else {
            info!(
                files = tree.total_files(),
                dirs = tree.total_dirs(),
                bytes = tree.total_size(),
                warnings = tree.warnings.len(),
                "scan finished"
            );
        }
        Ok(tree)
    }

    fn report_finished(&self, tree: &FileTree) {
        let _ = self.events_tx.send(ScanEvent::Finished(ScanSummary {
            files_scanned: tree.total_files(),
            dirs_scanned: tree.total_dirs(),
            bytes_scanned: tree.total_size(),
            errors_count: tree.warnings.len() as u64,
            cancelled: tree.cancelled,
            elapsed: tree.scan_duration,
        }));
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the running flag set for the lifetime of a scan.
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

/// Single-writer state for one scan.
struct TreeBuilder<'a> {
    tree: FileTree,
    dir_ids: HashMap<PathBuf, DirId>,
    events_tx: &'a broadcast::Sender<ScanEvent>,
}

impl<'a> TreeBuilder<'a> {
    fn new(tree: FileTree, events_tx: &'a broadcast::Sender<ScanEvent>) -> Self {
        let mut dir_ids = HashMap::new();
        dir_ids.insert(tree.root_path.clone(), tree.root_id());
        Self {
            tree,
            dir_ids,
            events_tx,
        }
    }

    fn run(
        &mut self,
        config: &ScanConfig,
        root_path: &Path,
        matcher: IgnoreMatcher,
        cancel: &CancellationToken,
    ) {
        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            1 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let hook_cancel = cancel.clone();
        let walker = WalkDirGeneric::<WalkState>::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(config.follow_symlinks)
            .min_depth(0)
            .max_depth(config.max_depth.map(|d| d as usize).unwrap_or(usize::MAX))
            .process_read_dir(move |_depth, _path, _state, children| {
                if hook_cancel.is_cancelled() {
                    children.clear();
                    return;
                }
                order_children(children, &matcher);
            });

        for entry_result in walker {
            if cancel.is_cancelled() {
                self.tree.cancelled = true;
                break;
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    self.skip(walk_warning(path, &err, WarningKind::ReadError));
                    continue;
                }
            };
            // The directory itself is kept, empty, when its listing fails.
            if let Some(err) = &entry.read_children_error {
                self.skip(walk_warning(entry.path(), err, WarningKind::ReadError));
            }
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            // The parent itself was skipped, so its contents are too.
            let Some(parent_id) = path.parent().and_then(|p| self.dir_ids.get(p)).copied() else {
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                debug!(path = %path.display(), "skipping symbolic link");
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    self.skip(walk_warning(path, &err, WarningKind::MetadataError));
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let timestamps = Timestamps::from_metadata(&metadata);

            if file_type.is_dir() {
                let id = self
                    .tree
                    .add_directory(parent_id, DirectoryNode::new(name, &path, timestamps));
                self.dir_ids.insert(path.clone(), id);

                let parent_path = self.tree.dir(parent_id).path().to_path_buf();
                self.emit(|| ScanEvent::DirectoryVisited(path.clone()));
                if let Some(percent) = entry.client_state.percent() {
                    self.emit(|| ScanEvent::LevelProgress {
                        parent: parent_path,
                        percent,
                    });
                }
            } else if file_type.is_file() {
                self.tree.add_file(
                    parent_id,
                    FileNode::new(name, &path, metadata.len(), timestamps),
                );
                self.emit(|| ScanEvent::FileVisited(path));
            }
        }
    }

    fn skip(&mut self, warning: ScanWarning) {
        warn!(path = %warning.path.display(), "{}", warning.message);
        self.tree.warnings.push(warning);
    }

    fn emit(&self, event: impl FnOnce() -> ScanEvent) {
        if self.events_tx.receiver_count() > 0 {
            let _ = self.events_tx.send(event());
        }
    }

    fn finish(self) -> FileTree {
        self.tree
    }
}

/// Read-dir hook: drop ignored entries, put files before subdirectories
/// (stable, so enumeration order is kept within each group) and rank the
/// subdirectories for per-level progress.
fn order_children(
    children: &mut Vec<Result<jwalk::DirEntry<WalkState>, jwalk::Error>>,
    matcher: &IgnoreMatcher,
) {
    children.retain(|child| match child {
        Ok(entry) => !matcher.should_skip(&entry.file_name().to_string_lossy()),
        Err(_) => true,
    });
    children.sort_by_key(|child| matches!(child, Ok(entry) if entry.file_type().is_dir()));

    let count = children
        .iter()
        .filter(|child| matches!(child, Ok(entry) if entry.file_type().is_dir()))
        .count();
    let mut index = 0;
    for entry in children.iter_mut().flatten() {
        if entry.file_type().is_dir() {
            entry.client_state = SiblingRank { index, count };
            index += 1;
        }
    }
}

fn walk_warning(path: PathBuf, err: &jwalk::Error, fallback: WarningKind) -> ScanWarning {
    match err.io_error() {
        Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            ScanWarning::permission_denied(path)
        }
        Some(io) if fallback == WarningKind::ReadError => ScanWarning::read_error(path, io),
        Some(io) => ScanWarning::from_io(path, io),
        None => ScanWarning::new(path, err.to_string(), fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    #[test]
    fn test_basic_scan() {
        let temp = create_test_tree();
        let config = ScanConfig::new(temp.path());

        let scanner = Scanner::new();
        let tree = scanner.scan(&config).unwrap();

        assert_eq!(tree.total_files(), 4);
        assert_eq!(tree.total_dirs(), 3);
        assert_eq!(tree.total_size(), 5 + 17 + 4 + 17);
        assert!(!tree.cancelled);
        assert!(tree.verify_invariants().is_ok());
        assert!(!scanner.is_running());
    }

    #[test]
    fn test_ignore_patterns() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["dir2".to_string()])
            .build()
            .unwrap();

        let tree = Scanner::new().scan(&config).unwrap();

        let root = tree.root_id();
        assert!(tree.subdirectory_named(root, "dir2").is_none());
        assert_eq!(tree.total_files(), 3);
    }

    #[test]
    fn test_max_depth() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .max_depth(Some(1u32))
            .build()
            .unwrap();

        let tree = Scanner::new().scan(&config).unwrap();

        // Only direct children of the root.
        assert_eq!(tree.total_files(), 1);
        assert_eq!(tree.total_dirs(), 2);
        assert!(tree.verify_invariants().is_ok());
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let temp = create_test_tree();
        let serial = ScanConfig::builder()
            .root(temp.path())
            .threads(1usize)
            .build()
            .unwrap();
        let parallel = ScanConfig::new(temp.path());

        let a = Scanner::new().scan(&serial).unwrap();
        let b = Scanner::new().scan(&parallel).unwrap();

        let names = |t: &FileTree| -> Vec<String> {
            t.files_in_order(t.root_id())
                .into_iter()
                .map(|id| t.file(id).path().display().to_string())
                .collect()
        };
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_pre_cancelled_scan_returns_root_only() {
        let temp = create_test_tree();
        let token = CancellationToken::new();
        token.cancel();

        let tree = Scanner::new()
            .scan_with_cancel(&ScanConfig::new(temp.path()), token)
            .unwrap();

        assert!(tree.cancelled);
        assert_eq!(tree.total_files(), 0);
        assert!(tree.verify_invariants().is_ok());
    }
}
