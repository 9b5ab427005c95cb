use super::Pipeline;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl Pipeline {
    /// Archives in the scratch directory with the active extension, oldest first
    pub(crate) async fn pending_archives(&self) -> Result<Vec<PathBuf>> {
        let extension = self.backend.extension();
        let mut entries = tokio::fs::read_dir(&self.scratch_dir)
            .await
            .map_err(|source| Error::Discovery {
                dir: self.scratch_dir.clone(),
                source,
            })?;

        let mut archives = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(extension));
            if matches {
                archives.push(path);
            }
        }

        archives.sort_by_cached_key(|path| (self.namer.sort_key(path), path.clone()));
        Ok(archives)
    }

    /// Upload every leftover archive, returning how many were delivered
    pub(crate) async fn redeliver_pending(&mut self) -> Result<usize> {
        let pending = match self.pending_archives().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "could not scan scratch directory");
                return Ok(0);
            }
        };

        let mut delivered = 0;
        for archive in pending {
            info!(archive = %archive.display(), "found existing archive");
            if self.deliver(&archive).await? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Upload one archive and delete it once the server accepted it
    ///
    /// Returns `Ok(false)` when the upload failed in normal mode; the archive
    /// then stays in scratch for the next re-delivery scan.
    pub(crate) async fn deliver(&mut self, archive: &Path) -> Result<bool> {
        if let Err(e) = self.uploader.upload(&mut self.state, archive).await {
            self.tolerate("upload", e)?;
            return Ok(false);
        }

        info!(archive = %archive.display(), "successfully uploaded");
        match tokio::fs::remove_file(archive).await {
            Ok(()) => debug!(archive = %archive.display(), "deleted delivered archive"),
            Err(e) => warn!(
                archive = %archive.display(),
                error = %e,
                "could not delete archive after upload"
            ),
        }
        Ok(true)
    }
}
