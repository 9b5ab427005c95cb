//! Archive creation and verification
//!
//! Two interchangeable backends produce the batch archives:
//! - [`RarArchiver`] drives the external `rar` tool
//! - [`ZipArchiver`] writes standard ZIP files in-process (deflate or store)
//!
//! Both embed members under their basenames only, so the archive never leaks
//! the local directory layout. The backend is chosen once at startup from the
//! configured [`ArchiveMode`] and whether `rar` is installed.

mod rar;
mod zip;


pub use rar::{RarArchiver, find_rar_executable};
pub use zip::ZipArchiver;

use crate::config::ArchiveMode;
use crate::error::Result;
use crate::types::ArchiveFormat;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Capability interface shared by the archive backends
///
/// # Examples
///
/// ```no_run
/// use astrocam::archive::{ArchiveBackend, ZipArchiver};
/// use std::path::Path;
///
/// # async fn example() -> astrocam::Result<()> {
/// let backend = ZipArchiver::new(true);
/// let members = vec!["064_2025-01-01_10-00-00.fts".to_string()];
/// let archive = Path::new("/data/temp/2025-01-01_064_100000.zip");
///
/// backend.create(archive, Path::new("/data/camera"), &members).await?;
/// backend.test_integrity(archive).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Write `archive` containing `members`, read from `source_dir`
    ///
    /// Members are stored under their basenames. A failure leaves whatever
    /// was written on disk; such a file must not be trusted.
    async fn create(&self, archive: &Path, source_dir: &Path, members: &[String]) -> Result<()>;

    /// Verify that `archive` is readable end to end
    async fn test_integrity(&self, archive: &Path) -> Result<()>;

    /// Container format this backend produces
    fn format(&self) -> ArchiveFormat;

    /// Archive file extension including the leading dot
    fn extension(&self) -> &'static str {
        self.format().extension()
    }

    /// One-line description for the startup summary
    fn describe(&self) -> String {
        self.format().to_string()
    }
}

/// Decide the archive format for a mode and tool availability
///
/// `rar` without the tool downgrades to compressed ZIP.
pub fn resolve_format(mode: ArchiveMode, rar_available: bool) -> ArchiveFormat {
    match mode {
        ArchiveMode::Auto | ArchiveMode::Rar if rar_available => ArchiveFormat::Rar,
        ArchiveMode::Rar => {
            warn!("RAR mode requested but rar command not found, falling back to compressed ZIP");
            ArchiveFormat::Zip { compressed: true }
        }
        ArchiveMode::Auto | ArchiveMode::Zip => ArchiveFormat::Zip { compressed: true },
        ArchiveMode::ZipUncompressed => ArchiveFormat::Zip { compressed: false },
    }
}

/// Build the backend for a mode, given the located `rar` binary (if any)
pub fn backend_for(mode: ArchiveMode, rar_path: Option<PathBuf>) -> Box<dyn ArchiveBackend> {
    let format = resolve_format(mode, rar_path.is_some());
    match (format, rar_path) {
        (ArchiveFormat::Rar, Some(path)) => {
            info!(binary = %path.display(), "using external RAR archiver");
            Box::new(RarArchiver::new(path))
        }
        (ArchiveFormat::Zip { compressed }, _) => {
            info!(compressed, "using built-in ZIP archiver");
            Box::new(ZipArchiver::new(compressed))
        }
        // resolve_format only yields Rar when a binary was found
        (ArchiveFormat::Rar, None) => Box::new(ZipArchiver::new(true)),
    }
}

/// Probe for `rar` and build the backend for a mode
pub fn select_backend(mode: ArchiveMode) -> Box<dyn ArchiveBackend> {
    backend_for(mode, find_rar_executable())
}
