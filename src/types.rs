//! Core types for astrocam

use std::path::{Path, PathBuf};

/// Identifier prefix grouping the images of one monitored sky field
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Area(String);

impl Area {
    /// Create a new Area from its token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Area {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for Area {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the process runs as a long-lived monitor or as a CI test run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Continuous monitoring; degraded conditions are logged and skipped
    #[default]
    Normal,
    /// Automated testing; every degraded condition is fatal and the run ends
    /// after two minutes without new files
    Test,
}

impl RunMode {
    /// Returns true in test mode
    pub fn is_test(&self) -> bool {
        matches!(self, RunMode::Test)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Normal => f.write_str("NORMAL OPERATION"),
            RunMode::Test => f.write_str("TEST"),
        }
    }
}

/// Container format produced by an archive backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// RAR container produced by the external `rar` tool
    Rar,
    /// Standard ZIP container, deflate when `compressed`, store otherwise
    Zip {
        /// Whether entries are deflated
        compressed: bool,
    },
}

impl ArchiveFormat {
    /// File extension including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Rar => ".rar",
            ArchiveFormat::Zip { .. } => ".zip",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::Rar => f.write_str("RAR"),
            ArchiveFormat::Zip { compressed: true } => f.write_str("ZIP"),
            ArchiveFormat::Zip { compressed: false } => f.write_str("ZIP (uncompressed)"),
        }
    }
}

/// One file selected for archiving
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    /// Basename stored inside the archive
    pub member_name: String,
    /// Absolute path used to relocate the file afterwards
    pub source_path: PathBuf,
}

/// A full, ordered batch of same-area files
///
/// Only the batch selector constructs these, and only when exactly
/// `batch_size` entries are available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileBatch {
    /// Area the files belong to
    pub area: Area,
    /// Directory the members are read from
    pub source_dir: PathBuf,
    /// Entries, oldest first
    pub entries: Vec<BatchEntry>,
}

impl FileBatch {
    /// Number of files in the batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch holds no files
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Archive member names in batch order
    pub fn member_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.member_name.clone()).collect()
    }

    /// Absolute source paths in batch order
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.source_path.clone()).collect()
    }

    /// Directory the members are read from
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}
