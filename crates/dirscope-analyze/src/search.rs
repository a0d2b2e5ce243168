//! Wildcard search over file names.

use globset::{GlobBuilder, GlobMatcher};

use dirscope_core::{FileId, FileTree};

use crate::error::{AnalyzeError, AnalyzeResult};

/// Compiled file-name pattern.
///
/// `*` matches any run of characters and `?` exactly one. Matching is
/// against the file name only, never the directory part.
#[derive(Debug, Clone)]
pub struct NamePattern {
    matcher: GlobMatcher,
}

impl NamePattern {
    pub fn new(pattern: &str, case_sensitive: bool) -> AnalyzeResult<Self> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|source| AnalyzeError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

/// Files whose name matches `pattern`, in traversal order.
pub fn find_by_pattern(
    tree: &FileTree,
    pattern: &str,
    case_sensitive: bool,
) -> AnalyzeResult<Vec<FileId>> {
    let pattern = NamePattern::new(pattern, case_sensitive)?;
    Ok(tree
        .files_in_order(tree.root_id())
        .into_iter()
        .filter(|id| pattern.matches(tree.file(*id).name()))
        .collect())
}
