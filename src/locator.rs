//! Area file discovery and batch selection
//!
//! Camera files are named `AREA_DATE_TIME...ext` (or `AREA-SF_...ext`). The
//! locator finds the files of one area in the camera directory and orders them
//! by the part after the first underscore, which is chronological for that
//! naming convention. The selector then takes the oldest `batch_size` files,
//! or nothing at all when not enough have accumulated yet.

use crate::error::{Error, Result};
use crate::types::{Area, BatchEntry, FileBatch};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// FITS extensions probed at startup, in priority order
pub const FITS_EXTENSIONS: [&str; 3] = [".fts", ".fits", ".fit"];

/// Extension used when the camera directory holds no FITS files yet
pub const DEFAULT_FITS_EXTENSION: &str = ".fts";

/// Build the file name pattern for an area: `^AREA(_|-SF_).*EXT$`
pub fn area_pattern(area: &Area, extension: &str) -> Result<Regex> {
    let pattern = format!(
        "^{}(_|-SF_).*{}$",
        regex::escape(area.as_str()),
        regex::escape(extension)
    );
    Regex::new(&pattern).map_err(|e| Error::Config {
        message: format!("invalid file pattern for area {}: {}", area, e),
        key: None,
    })
}

/// List the files of `area` in `dir`, oldest first
///
/// Only regular entries directly inside `dir` are considered. The extension
/// match is exact and case-sensitive.
pub fn locate_area_files(area: &Area, dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let pattern = area_pattern(area, extension)?;

    let entries = std::fs::read_dir(dir).map_err(|e| Error::Discovery {
        dir: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::Discovery {
            dir: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        // Skip directories
        if path.is_dir() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if pattern.is_match(name) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| {
        name_sort_key(a)
            .cmp(&name_sort_key(b))
            .then_with(|| a.cmp(b))
    });

    debug!(%area, dir = %dir.display(), count = files.len(), "located area files");
    Ok(files)
}

/// Sort key for a camera file: the name after the first `_`, without extension
///
/// Falls back to the whole file name when there is no underscore.
pub fn name_sort_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(underscore) = name.find('_') else {
        return name;
    };

    let rest = &name[underscore + 1..];
    match rest.rfind('.') {
        Some(dot) => rest[..dot].to_string(),
        None => rest.to_string(),
    }
}

/// Take the oldest `batch_size` files as one batch
///
/// Returns `None` when fewer than `batch_size` files are available; partial
/// batches are never produced. Source paths are canonicalized so relocation
/// does not depend on the working directory.
pub fn select_batch(
    area: &Area,
    source_dir: &Path,
    located: &[PathBuf],
    batch_size: usize,
) -> Option<FileBatch> {
    if batch_size == 0 || located.len() < batch_size {
        return None;
    }

    let entries = located[..batch_size]
        .iter()
        .filter_map(|path| {
            let member_name = path.file_name()?.to_string_lossy().into_owned();
            let source_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            debug!(%area, file = %path.display(), "selected for batch");
            Some(BatchEntry {
                member_name,
                source_path,
            })
        })
        .collect::<Vec<_>>();

    // Paths from the locator always have a file name
    (entries.len() == batch_size).then(|| FileBatch {
        area: area.clone(),
        source_dir: source_dir.to_path_buf(),
        entries,
    })
}

/// Pick the FITS extension in use by probing the camera directory
///
/// The first of [`FITS_EXTENSIONS`] with at least one file wins; an empty or
/// unreadable directory yields [`DEFAULT_FITS_EXTENSION`].
pub fn detect_fits_extension(dir: &Path) -> &'static str {
    let names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| !e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect(),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "camera directory not readable while probing extensions");
            Vec::new()
        }
    };

    for ext in FITS_EXTENSIONS {
        let count = names.iter().filter(|n| n.ends_with(ext)).count();
        if count > 0 {
            info!(extension = ext, files = count, "FITS file extension detected");
            return ext;
        }
        debug!(extension = ext, "no files with extension");
    }

    info!(
        extension = DEFAULT_FITS_EXTENSION,
        "no FITS files found, using default extension"
    );
    DEFAULT_FITS_EXTENSION
}
