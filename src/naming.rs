//! Archive file naming
//!
//! Archives are named `YYYY-MM-DD_{prefix}{area}_HHMMSS{postfix}{ext}`. The
//! companion [`ArchiveNamer::sort_key`] recovers `YYYYMMDDHHMMSS` from such a
//! name so leftover archives can be re-delivered oldest first.

use crate::types::Area;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use std::path::Path;

/// Derives archive names from the configured prefix/postfix and format
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveNamer {
    prefix: String,
    postfix: String,
    extension: String,
}

impl ArchiveNamer {
    /// Create a namer; `extension` includes the leading dot
    pub fn new(
        prefix: impl Into<String>,
        postfix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            postfix: postfix.into(),
            extension: extension.into(),
        }
    }

    /// Archive extension including the leading dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Build the archive file name for an area at a given date and time
    pub fn name(&self, date: NaiveDate, area: &Area, time: NaiveTime) -> String {
        format!(
            "{}_{}{}_{}{}{}",
            date.format("%Y-%m-%d"),
            self.prefix,
            area,
            time.format("%H%M%S"),
            self.postfix,
            self.extension
        )
    }

    /// Build the archive file name for an area at a point in time
    pub fn name_at<Tz: TimeZone>(&self, at: &DateTime<Tz>, area: &Area) -> String {
        let local = at.naive_local();
        self.name(local.date(), area, local.time())
    }

    /// Chronological sort key for an archive file name or path
    ///
    /// Strips the extension and postfix, then joins the date (before the
    /// first `_`) with the time (from the last `_`) and drops every `-`/`_`.
    /// Exact for names produced by [`ArchiveNamer::name`]; best effort for
    /// anything else.
    pub fn sort_key(&self, archive: impl AsRef<Path>) -> String {
        let file_name = archive
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut stem = file_name.as_str();
        if !self.extension.is_empty() {
            stem = stem.strip_suffix(self.extension.as_str()).unwrap_or(stem);
        }
        if !self.postfix.is_empty() {
            stem = stem.strip_suffix(self.postfix.as_str()).unwrap_or(stem);
        }

        let (Some(first), Some(last)) = (stem.find('_'), stem.rfind('_')) else {
            return stem.to_string();
        };

        let date = &stem[..first];
        let time = &stem[last..];
        format!("{date}{time}")
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect()
    }
}
