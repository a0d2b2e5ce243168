use dirscope_analyze::{
    CancellationToken, DuplicateConfig, DuplicateFinder, DuplicateReport, ExtensionKey, HashEvent,
    extension_statistics, find_by_pattern, largest_files, size_statistics,
};
use dirscope_core::{FileId, FileTree};
use dirscope_scan::{ScanConfig, Scanner};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn scan(root: &Path) -> FileTree {
    Scanner::new().scan(&ScanConfig::new(root)).unwrap()
}

fn names(tree: &FileTree, ids: &[FileId]) -> Vec<String> {
    ids.iter().map(|id| tree.file(*id).name().to_string()).collect()
}

/// Root
/// ├── Original.txt  "Same content"
/// ├── Duplicate1.txt "Same content"
/// └── Different.txt "Different content"
fn create_duplicate_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("Original.txt"), "Same content").unwrap();
    fs::write(root.join("Duplicate1.txt"), "Same content").unwrap();
    fs::write(root.join("Different.txt"), "Different content").unwrap();
    temp
}

#[test]
fn test_duplicate_config_builder() {
    let config = DuplicateConfig::builder()
        .min_size(2048u64)
        .verify_contents(true)
        .parallel(false)
        .build()
        .unwrap();

    assert_eq!(config.min_size, 2048);
    assert!(config.verify_contents);
    assert!(!config.parallel);

    let default_config = DuplicateConfig::default();
    assert_eq!(default_config.min_size, 0);
    assert!(!default_config.verify_contents);
    assert!(default_config.parallel);
}

#[test]
fn test_duplicates_flag_later_members_only() {
    let temp = create_duplicate_tree();
    let mut tree = scan(temp.path());

    let report = DuplicateFinder::new().find_duplicates(&mut tree);

    assert_eq!(report.group_count(), 1);
    let group = report.groups.values().next().unwrap();
    assert_eq!(group.count(), 2);
    assert_eq!(group.size, 12);
    assert_eq!(report.total_wasted_space(), 12);

    // The original is whichever same-content file the traversal met first.
    let order = tree.files_in_order(tree.root_id());
    let same: Vec<FileId> = order
        .iter()
        .copied()
        .filter(|id| tree.file(*id).name() != "Different.txt")
        .collect();
    assert_eq!(group.original(), same[0]);
    assert!(!tree.file(same[0]).is_duplicate());
    assert!(tree.file(same[1]).is_duplicate());

    let different = tree.file_named(tree.root_id(), "Different.txt").unwrap();
    assert!(!tree.file(different).is_duplicate());

    // Every processed file carries its hash; equal content means equal hash.
    assert_eq!(
        tree.file(same[0]).content_hash(),
        tree.file(same[1]).content_hash()
    );
    assert_ne!(
        tree.file(same[0]).content_hash(),
        tree.file(different).content_hash()
    );
    assert!(tree.file(different).content_hash().is_some());
}

#[test]
fn test_files_in_parent_precede_subdirectory_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("aaa")).unwrap();
    fs::write(root.join("aaa/copy.bin"), "payload").unwrap();
    fs::write(root.join("zzz.bin"), "payload").unwrap();

    let mut tree = scan(root);
    let report = DuplicateFinder::new().find_duplicates(&mut tree);

    let group = report.groups.values().next().unwrap();
    assert_eq!(tree.file(group.original()).name(), "zzz.bin");
    assert_eq!(names(&tree, group.duplicates()), vec!["copy.bin"]);
}

#[test]
fn test_duplicate_detection_is_idempotent() {
    let temp = create_duplicate_tree();
    let mut tree = scan(temp.path());
    let finder = DuplicateFinder::new();

    let first = finder.find_duplicates(&mut tree);
    let flags_before: Vec<bool> = tree.files().map(|(_, f)| f.is_duplicate()).collect();

    let second = finder.find_duplicates(&mut tree);
    let flags_after: Vec<bool> = tree.files().map(|(_, f)| f.is_duplicate()).collect();

    assert_eq!(flags_before, flags_after);
    assert_eq!(first.groups, second.groups);
}

#[test]
fn test_stale_flags_are_cleared_after_content_changes() {
    let temp = create_duplicate_tree();
    let mut tree = scan(temp.path());
    let finder = DuplicateFinder::new();
    finder.find_duplicates(&mut tree);
    assert_eq!(tree.files().filter(|(_, f)| f.is_duplicate()).count(), 1);

    fs::write(temp.path().join("Duplicate1.txt"), "Changed ctnt").unwrap();
    fs::write(temp.path().join("Original.txt"), "Now unique!!").unwrap();
    let report = finder.find_duplicates(&mut tree);

    assert!(!report.has_duplicates());
    assert_eq!(tree.files().filter(|(_, f)| f.is_duplicate()).count(), 0);
}

#[test]
fn test_analyze_does_not_modify_tree() {
    let temp = create_duplicate_tree();
    let tree = scan(temp.path());

    let report = DuplicateFinder::new().analyze(&tree, CancellationToken::new());

    assert!(report.has_duplicates());
    assert_eq!(report.files_analyzed, 3);
    assert!(tree.files().all(|(_, f)| f.content_hash().is_none() && !f.is_duplicate()));
}

#[test]
fn test_serial_and_parallel_hashing_agree() {
    let temp = TempDir::new().unwrap();
    for i in 0..30 {
        fs::write(temp.path().join(format!("f{i:02}")), format!("content {}", i % 4)).unwrap();
    }
    let tree = scan(temp.path());

    let serial = DuplicateFinder::with_config(
        DuplicateConfig::builder().parallel(false).build().unwrap(),
    )
    .analyze(&tree, CancellationToken::new());
    let parallel = DuplicateFinder::new().analyze(&tree, CancellationToken::new());

    assert_eq!(serial.groups, parallel.groups);
    assert_eq!(serial.hashes, parallel.hashes);
    assert_eq!(serial.group_count(), 4);
    assert_eq!(serial.files_with_duplicates(), 30);
}

#[test]
fn test_min_size_skips_small_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a"), "x").unwrap();
    fs::write(temp.path().join("b"), "x").unwrap();
    fs::write(temp.path().join("c"), "long enough").unwrap();
    fs::write(temp.path().join("d"), "long enough").unwrap();
    let mut tree = scan(temp.path());

    let finder = DuplicateFinder::with_config(
        DuplicateConfig::builder().min_size(5u64).build().unwrap(),
    );
    let report = finder.find_duplicates(&mut tree);

    assert_eq!(report.group_count(), 1);
    assert_eq!(report.files_analyzed, 2);
    let a = tree.file_named(tree.root_id(), "a").unwrap();
    assert!(tree.file(a).content_hash().is_none());
}

#[test]
fn test_verify_contents_keeps_identical_groups() {
    let temp = create_duplicate_tree();
    let mut tree = scan(temp.path());

    let finder = DuplicateFinder::with_config(
        DuplicateConfig::builder().verify_contents(true).build().unwrap(),
    );
    let report = finder.find_duplicates(&mut tree);

    assert_eq!(report.group_count(), 1);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_cancelled_before_start_hashes_nothing() {
    let temp = create_duplicate_tree();
    let mut tree = scan(temp.path());

    let token = CancellationToken::new();
    token.cancel();
    let report = DuplicateFinder::new().find_duplicates_with_cancel(&mut tree, token);

    assert!(report.cancelled);
    assert!(report.hashes.is_empty());
    assert!(!report.has_duplicates());
    assert!(tree.files().all(|(_, f)| f.content_hash().is_none()));
}

/// Hash `tree` serially, cancelling from another thread on the first
/// hashed file.
fn hash_cancelled_after_first_file(mut tree: FileTree) -> (FileTree, DuplicateReport) {
    let finder = DuplicateFinder::with_config(
        DuplicateConfig::builder().parallel(false).build().unwrap(),
    );
    let mut events = finder.subscribe();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let watcher = std::thread::spawn(move || {
        while let Ok(event) = events.blocking_recv() {
            if matches!(event, HashEvent::FileHashed(_)) {
                trigger.cancel();
                break;
            }
        }
    });

    let report = finder.find_duplicates_with_cancel(&mut tree, token);
    watcher.join().unwrap();
    assert!(!finder.is_running());
    (tree, report)
}

#[test]
fn test_cancel_mid_run_keeps_computed_hashes() {
    let temp = TempDir::new().unwrap();
    for i in 0..400 {
        fs::write(temp.path().join(format!("f{i:03}")), vec![b'a'; 16 * 1024]).unwrap();
    }
    let tree = scan(temp.path());

    // The cancel races the hashing loop; a finished run is retried.
    let (tree, report) = (0..25)
        .map(|_| hash_cancelled_after_first_file(tree.clone()))
        .find(|(_, report)| report.cancelled)
        .expect("no run observed the cancellation");

    let hashed: Vec<FileId> = tree
        .files()
        .filter(|(_, f)| f.content_hash().is_some())
        .map(|(id, _)| id)
        .collect();
    assert!(report.cancelled);
    assert!(!hashed.is_empty());
    assert!(hashed.len() < 400);
    assert_eq!(hashed.len() as u64, report.files_analyzed);

    // Serial hashing stops on a prefix of traversal order.
    let order = tree.files_in_order(tree.root_id());
    assert_eq!(hashed.len(), order.iter().take_while(|id| hashed.contains(id)).count());

    // Identical content: every hashed file past the first is a duplicate.
    let flagged = tree.files().filter(|(_, f)| f.is_duplicate()).count();
    assert_eq!(flagged, hashed.len().saturating_sub(1));
}

#[test]
fn test_duplicate_found_events() {
    let temp = create_duplicate_tree();
    let mut tree = scan(temp.path());
    let finder = DuplicateFinder::new();
    let mut events = finder.subscribe();

    finder.find_duplicates(&mut tree);

    let mut hashed = 0;
    let mut found = Vec::new();
    let mut last_percent = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            HashEvent::FileHashed(_) => hashed += 1,
            HashEvent::DuplicateFound { original, duplicate } => found.push((original, duplicate)),
            HashEvent::Progress { percent } => last_percent = last_percent.max(percent),
        }
    }

    assert_eq!(hashed, 3);
    assert_eq!(found.len(), 1);
    assert_ne!(found[0].0, found[0].1);
    assert_eq!(last_percent, 100);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_reported_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let temp = create_duplicate_tree();
    let locked = temp.path().join("Locked.txt");
    fs::write(&locked, "Same content").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read it anyway; nothing to check then.
    if fs::read(&locked).is_ok() {
        return;
    }

    let mut tree = scan(temp.path());
    let report = DuplicateFinder::new().find_duplicates(&mut tree);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].path.ends_with("Locked.txt"));
    assert_eq!(report.group_count(), 1);
    assert_eq!(report.groups.values().next().unwrap().count(), 2);

    let id = tree.file_named(tree.root_id(), "Locked.txt").unwrap();
    assert!(tree.file(id).content_hash().is_none());
    assert!(!tree.file(id).is_duplicate());
}

#[test]
fn test_size_statistics_on_disk() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("SubDir1")).unwrap();
    fs::create_dir(root.join("SubDir2")).unwrap();
    fs::write(root.join("SubDir1/File1.txt"), vec![0u8; 10]).unwrap();
    fs::write(root.join("SubDir1/File2.txt"), vec![0u8; 20]).unwrap();
    fs::write(root.join("SubDir2/File3.txt"), vec![0u8; 30]).unwrap();
    let tree = scan(root);

    let stats = size_statistics(&tree);

    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0].size, 60);
    assert_eq!(stats[0].percentage, 100.0);
    assert_eq!(stats[1].percentage, 50.0);
    assert_eq!(stats[2].percentage, 50.0);
    // Ties keep enumeration order.
    let subdirs: Vec<&str> = tree
        .root()
        .subdirectories()
        .iter()
        .map(|id| tree.dir(*id).name())
        .collect();
    assert_eq!(vec![stats[1].name.as_str(), stats[2].name.as_str()], subdirs);
}

#[test]
fn test_size_statistics_empty_root_is_empty() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("empty")).unwrap();
    let tree = scan(temp.path());

    assert!(size_statistics(&tree).is_empty());
}

#[test]
fn test_largest_files_returns_top_n() {
    let temp = TempDir::new().unwrap();
    for (name, size) in [("f5", 5), ("f1", 1), ("f9", 9), ("f3", 3), ("f7", 7)] {
        fs::write(temp.path().join(name), vec![0u8; size]).unwrap();
    }
    let tree = scan(temp.path());

    let top: Vec<u64> = largest_files(&tree, 2)
        .into_iter()
        .map(|id| tree.file(id).size())
        .collect();
    assert_eq!(top, vec![9, 7]);

    assert!(largest_files(&tree, 0).is_empty());
    assert_eq!(largest_files(&tree, 50).len(), 5);
}

#[test]
fn test_extension_statistics_on_disk() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("a.TXT"), vec![0u8; 4]).unwrap();
    fs::write(root.join("b.txt"), vec![0u8; 6]).unwrap();
    fs::write(root.join("README"), vec![0u8; 3]).unwrap();
    fs::write(root.join(".gitignore"), vec![0u8; 2]).unwrap();
    let tree = scan(root);

    let stats = extension_statistics(&tree);

    assert_eq!(stats.get(&ExtensionKey::from_extension(Some("txt"))), Some(10));
    // Dotfiles have no extension.
    assert_eq!(stats.get(&ExtensionKey::NoExtension), Some(5));
    assert_eq!(stats.total_bytes(), tree.total_size());
    assert_eq!(stats.len(), 2);
}

#[test]
fn test_find_by_pattern() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("logs")).unwrap();
    fs::write(root.join("notes.txt"), "n").unwrap();
    fs::write(root.join("logs/app1.LOG"), "a").unwrap();
    fs::write(root.join("logs/app22.log"), "b").unwrap();
    let tree = scan(root);

    let logs = find_by_pattern(&tree, "app?.log", false).unwrap();
    assert_eq!(names(&tree, &logs), vec!["app1.LOG"]);

    let all_logs = find_by_pattern(&tree, "*.log", false).unwrap();
    assert_eq!(all_logs.len(), 2);

    let exact = find_by_pattern(&tree, "*.log", true).unwrap();
    assert_eq!(names(&tree, &exact), vec!["app22.log"]);

    assert!(find_by_pattern(&tree, "[", false).is_err());
}
