//! Error types for analysis operations.

use thiserror::Error;

/// Errors raised before an analysis starts.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The wildcard pattern could not be compiled.
    #[error("Invalid search pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Result type for analysis operations.
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;
