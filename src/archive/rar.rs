//! External RAR archiver

use super::ArchiveBackend;
use crate::error::{ArchiveError, Error, Result};
use crate::types::ArchiveFormat;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// WinRAR install locations checked when `rar` is not on PATH
#[cfg(windows)]
const WINDOWS_RAR_PATHS: [&str; 2] = [
    r"C:\Program Files\WinRAR\rar.exe",
    r"C:\Program Files (x86)\WinRAR\rar.exe",
];

/// Locate the `rar` binary on PATH (and in the WinRAR folders on Windows)
pub fn find_rar_executable() -> Option<PathBuf> {
    if let Ok(path) = which::which("rar") {
        return Some(path);
    }

    #[cfg(windows)]
    for candidate in WINDOWS_RAR_PATHS {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return Some(path);
        }
    }

    None
}

/// Archiver that shells out to the `rar` binary
///
/// Runs `rar a -ep1 <archive> <members...>` from inside the source directory
/// so only basenames end up in the archive, and `rar t <archive>` to verify.
pub struct RarArchiver {
    binary_path: PathBuf,
}

impl RarArchiver {
    /// Create an archiver with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find `rar` and build an archiver for it
    pub fn from_path() -> Option<Self> {
        find_rar_executable().map(Self::new)
    }

    fn describe_output(output: &Output) -> String {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut reason = format!("rar exited with {}", output.status);
        for (label, text) in [("stdout", stdout.trim()), ("stderr", stderr.trim())] {
            if !text.is_empty() {
                reason.push_str(&format!("; {label}: {text}"));
            }
        }
        reason
    }
}

#[async_trait]
impl ArchiveBackend for RarArchiver {
    async fn create(&self, archive: &Path, source_dir: &Path, members: &[String]) -> Result<()> {
        debug!(archive = %archive.display(), source_dir = %source_dir.display(), members = members.len(), "running rar a");

        let output = Command::new(&self.binary_path)
            .arg("a") // Add
            .arg("-ep1") // Store paths relative to the working directory
            .arg(archive)
            .args(members)
            .current_dir(source_dir)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute rar: {}", e)))?;

        if !output.status.success() {
            return Err(ArchiveError::CreationFailed {
                archive: archive.to_path_buf(),
                reason: Self::describe_output(&output),
            }
            .into());
        }

        Ok(())
    }

    async fn test_integrity(&self, archive: &Path) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("t") // Test
            .arg(archive)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute rar: {}", e)))?;

        if !output.status.success() {
            return Err(ArchiveError::IntegrityFailed {
                archive: archive.to_path_buf(),
                reason: Self::describe_output(&output),
            }
            .into());
        }

        Ok(())
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    fn describe(&self) -> String {
        format!("RAR (using {})", self.binary_path.display())
    }
}
