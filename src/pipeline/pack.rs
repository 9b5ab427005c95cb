use super::{FAILED_SUFFIX, Pipeline};
use crate::error::Result;
use crate::locator::{locate_area_files, select_batch};
use crate::types::Area;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of packing one area
#[derive(Debug)]
pub(crate) enum Packed {
    /// Fewer files than a full batch
    NoBatch,
    /// A batch was selected but its archive could not be trusted
    Abandoned,
    /// Verified archive ready for delivery
    Ready(PathBuf),
}

/// What the area scan did
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct AreaScan {
    pub(crate) found_batch: bool,
    pub(crate) archived: usize,
    pub(crate) uploaded: usize,
}

impl Pipeline {
    /// Pack and deliver a batch for every area that has one
    pub(crate) async fn scan_areas(&mut self) -> Result<AreaScan> {
        let areas = self.areas.clone();
        let mut scan = AreaScan::default();

        for area in &areas {
            let archive = match self.pack_area(area).await? {
                Packed::NoBatch => continue,
                Packed::Abandoned => {
                    scan.found_batch = true;
                    continue;
                }
                Packed::Ready(archive) => archive,
            };
            scan.found_batch = true;
            scan.archived += 1;
            info!(%area, archive = %archive.display(), "archive created");
            if self.deliver(&archive).await? {
                scan.uploaded += 1;
            }
        }

        Ok(scan)
    }

    /// Select, archive, verify and relocate one batch for `area`
    pub(crate) async fn pack_area(&mut self, area: &Area) -> Result<Packed> {
        let located = match locate_area_files(area, &self.camera_dir, self.fits_extension) {
            Ok(located) => located,
            Err(e) => {
                warn!(%area, error = %e, "skipping area");
                return Ok(Packed::NoBatch);
            }
        };

        if !located.is_empty() {
            debug!(%area, files = located.len(), need = self.batch_size, "area files found");
        }

        let Some(batch) = select_batch(area, &self.camera_dir, &located, self.batch_size) else {
            return Ok(Packed::NoBatch);
        };

        info!(
            %area,
            files = batch.len(),
            settle_secs = self.options.settle_delay.as_secs(),
            "batch ready, waiting for writes to complete"
        );
        tokio::time::sleep(self.options.settle_delay).await;

        let archive = self
            .scratch_dir
            .join(self.namer.name_at(&chrono::Local::now(), area));
        info!(
            format = %self.backend.format(),
            archive = %archive.display(),
            "creating archive"
        );

        if let Err(e) = self
            .backend
            .create(&archive, batch.source_dir(), &batch.member_names())
            .await
        {
            abandon(&archive).await;
            self.tolerate("archive creation", e)?;
            return Ok(Packed::Abandoned);
        }

        if let Err(e) = self.backend.test_integrity(&archive).await {
            abandon(&archive).await;
            self.tolerate("archive integrity test", e)?;
            return Ok(Packed::Abandoned);
        }

        // Normal mode keeps going with the verified archive even when some
        // sources could not be moved
        if let Err(e) = self.relocator.relocate(&batch.source_paths()).await {
            self.tolerate("relocation", e)?;
        }

        Ok(Packed::Ready(archive))
    }
}

/// Path an untrusted archive is renamed to
pub(crate) fn failed_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(FAILED_SUFFIX);
    PathBuf::from(name)
}

/// Move an untrusted archive out of the re-delivery scan's way
async fn abandon(archive: &Path) {
    if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
        return;
    }

    let target = failed_path(archive);
    match tokio::fs::rename(archive, &target).await {
        Ok(()) => warn!(archive = %target.display(), "archive abandoned"),
        Err(e) => warn!(
            archive = %archive.display(),
            error = %e,
            "could not set aside abandoned archive"
        ),
    }
}
