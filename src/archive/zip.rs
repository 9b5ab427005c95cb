//! Built-in ZIP archiver

use super::ArchiveBackend;
use crate::error::{ArchiveError, Error, Result};
use crate::types::ArchiveFormat;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::debug;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// Archiver that writes standard ZIP files in-process
///
/// Entries are deflated when `compressed`, stored otherwise. Each entry keeps
/// the modification time of its source file.
pub struct ZipArchiver {
    compressed: bool,
}

impl ZipArchiver {
    /// Create a ZIP archiver
    pub fn new(compressed: bool) -> Self {
        Self { compressed }
    }

    fn compression_method(&self) -> CompressionMethod {
        if self.compressed {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        }
    }
}

/// Convert a file modification time into a ZIP timestamp
///
/// ZIP timestamps cover 1980..=2107 only; anything outside falls back to the
/// format's default.
fn zip_timestamp(metadata: &std::fs::Metadata) -> zip::DateTime {
    let Ok(modified) = metadata.modified() else {
        return zip::DateTime::default();
    };
    let local: DateTime<Local> = modified.into();

    let (Ok(year), Ok(month), Ok(day), Ok(hour), Ok(minute), Ok(second)) = (
        u16::try_from(local.year()),
        u8::try_from(local.month()),
        u8::try_from(local.day()),
        u8::try_from(local.hour()),
        u8::try_from(local.minute()),
        u8::try_from(local.second()),
    ) else {
        return zip::DateTime::default();
    };

    zip::DateTime::from_date_and_time(year, month, day, hour, minute, second).unwrap_or_default()
}

fn write_zip(
    archive: &Path,
    source_dir: &Path,
    members: &[String],
    method: CompressionMethod,
) -> std::result::Result<(), String> {
    let file = File::create(archive).map_err(|e| format!("failed to create archive: {}", e))?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));

    for member in members {
        let path = source_dir.join(member);
        let mut input =
            File::open(&path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
        let metadata = input
            .metadata()
            .map_err(|e| format!("failed to stat {}: {}", path.display(), e))?;

        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(zip_timestamp(&metadata))
            .large_file(metadata.len() >= u64::from(u32::MAX));

        writer
            .start_file(member.as_str(), options)
            .map_err(|e| format!("failed to add {}: {}", member, e))?;
        io::copy(&mut input, &mut writer)
            .map_err(|e| format!("failed to write {}: {}", member, e))?;
    }

    let mut inner = writer
        .finish()
        .map_err(|e| format!("failed to finalize archive: {}", e))?;
    inner
        .flush()
        .map_err(|e| format!("failed to flush archive: {}", e))?;

    Ok(())
}

/// Read every entry to the end so stored CRCs are checked
fn verify_zip(archive: &Path) -> std::result::Result<usize, String> {
    let file = File::open(archive).map_err(|e| format!("failed to open archive: {}", e))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| format!("failed to read archive: {}", e))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| format!("failed to open entry {}: {}", index, e))?;
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| format!("entry {} is corrupt: {}", name, e))?;
    }

    Ok(zip.len())
}

#[async_trait]
impl ArchiveBackend for ZipArchiver {
    async fn create(&self, archive: &Path, source_dir: &Path, members: &[String]) -> Result<()> {
        debug!(archive = %archive.display(), source_dir = %source_dir.display(), members = members.len(), compressed = self.compressed, "writing zip archive");

        let archive_owned: PathBuf = archive.to_path_buf();
        let source_owned = source_dir.to_path_buf();
        let members_owned = members.to_vec();
        let method = self.compression_method();

        let result = spawn_blocking(move || {
            write_zip(&archive_owned, &source_owned, &members_owned, method)
        })
        .await
        .map_err(|e| Error::ExternalTool(format!("zip task panicked: {}", e)))?;

        result.map_err(|reason| {
            ArchiveError::CreationFailed {
                archive: archive.to_path_buf(),
                reason,
            }
            .into()
        })
    }

    async fn test_integrity(&self, archive: &Path) -> Result<()> {
        let archive_owned = archive.to_path_buf();

        let result = spawn_blocking(move || verify_zip(&archive_owned))
            .await
            .map_err(|e| Error::ExternalTool(format!("zip task panicked: {}", e)))?;

        match result {
            Ok(entries) => {
                debug!(archive = %archive.display(), entries, "zip integrity check passed");
                Ok(())
            }
            Err(reason) => Err(ArchiveError::IntegrityFailed {
                archive: archive.to_path_buf(),
                reason,
            }
            .into()),
        }
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip {
            compressed: self.compressed,
        }
    }
}
