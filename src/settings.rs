//! User settings stored in `settings.toml`.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Persistent defaults; command-line flags override them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanSettings,
    pub duplicates: DuplicateSettings,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub follow_symlinks: bool,
    pub include_hidden: bool,
    pub ignore_patterns: Vec<String>,
    /// Worker threads, 0 for one per core.
    pub threads: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSettings {
    /// Smallest file considered, e.g. "1KB".
    pub min_size: Option<String>,
    pub verify_contents: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Rows shown by `largest`.
    pub top: usize,
    /// Path width before middle truncation.
    pub path_width: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top: dirscope_analyze::DEFAULT_LARGEST,
            path_width: 60,
        }
    }
}

impl Settings {
    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dirscope").join("settings.toml"))
    }

    /// Load settings from `explicit`, or from the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
