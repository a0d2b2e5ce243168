//! Human-readable formatting helpers.

use std::path::Path;

/// Format a byte count with binary units (KiB, MiB, ...).
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Shorten a path to at most `max_len` characters by cutting the middle.
///
/// The file name is kept intact when it fits; otherwise only its tail is
/// shown. The cut is marked with `...`.
pub fn shorten_path(path: &Path, max_len: usize) -> String {
    let full = path.to_string_lossy();
    if full.chars().count() <= max_len {
        return full.into_owned();
    }

    let file_name: Vec<char> = path
        .file_name()
        .map(|n| n.to_string_lossy().chars().collect())
        .unwrap_or_default();
    let directory: Vec<char> = path
        .parent()
        .map(|p| p.to_string_lossy().chars().collect())
        .unwrap_or_default();

    let budget = max_len.saturating_sub(3);
    if file_name.len() >= budget {
        let tail: String = file_name[file_name.len() - budget..].iter().collect();
        return format!("...{tail}");
    }

    let remaining = budget - file_name.len();
    let head: String = directory.iter().take(remaining).collect();
    let name: String = file_name.iter().collect();
    format!("{head}...{name}")
}
