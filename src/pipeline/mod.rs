//! Pipeline controller
//!
//! Each scan runs two stages in order:
//! 1. Re-deliver - upload archives left in the scratch directory by earlier scans
//! 2. Pack - per area, select a full batch, archive it, verify the archive,
//!    relocate the sources and upload the result
//!
//! Scans are driven by a fixed-period timer until shutdown is requested or,
//! in test mode, until no batch has been found for the idle timeout.

use crate::archive::ArchiveBackend;
use crate::config::{Config, MIN_INTERVAL};
use crate::error::{Error, Result};
use crate::locator::detect_fits_extension;
use crate::naming::ArchiveNamer;
use crate::relocation::Relocator;
use crate::retry::RetryPolicy;
use crate::throttle::{DeliveryState, MIN_UPLOAD_INTERVAL, UploadThrottle};
use crate::types::{Area, RunMode};
use crate::upload::Uploader;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

mod deliver;
mod pack;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Name of the scratch directory under the executable directory
pub const SCRATCH_DIR_NAME: &str = "temp";

/// Suffix given to archives that failed creation or verification
pub const FAILED_SUFFIX: &str = ".failed";

/// Timing knobs of the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Pause between selecting a batch and archiving it, so the camera can
    /// finish writing the newest file
    pub settle_delay: Duration,
    /// Test mode ends successfully after this long without a new batch
    pub idle_timeout: Duration,
    /// Minimum spacing between upload attempts
    pub upload_interval: Duration,
    /// Retry policy for relocating batch files
    pub relocation: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(120),
            upload_interval: MIN_UPLOAD_INTERVAL,
            relocation: RetryPolicy::default(),
        }
    }
}

/// Why [`Pipeline::run`] returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// A shutdown signal arrived
    Shutdown,
    /// Test mode saw no new batch for the idle timeout
    IdleTimeout,
}

/// What one scan did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IterationSummary {
    /// Leftover archives uploaded by the re-delivery stage
    pub redelivered: usize,
    /// Archives created from new batches
    pub archived: usize,
    /// Freshly created archives uploaded in the same scan
    pub uploaded: usize,
}

/// Owns every component and the delivery state for the process lifetime
pub struct Pipeline {
    areas: Vec<Area>,
    camera_dir: PathBuf,
    scratch_dir: PathBuf,
    batch_size: usize,
    scan_interval: Duration,
    fits_extension: &'static str,
    backend: Box<dyn ArchiveBackend>,
    namer: ArchiveNamer,
    relocator: Relocator,
    uploader: Uploader,
    mode: RunMode,
    options: PipelineOptions,
    state: DeliveryState,
}

impl Pipeline {
    /// Build the pipeline, creating the processed and scratch directories
    ///
    /// # Errors
    /// Returns error if a directory cannot be created or the HTTP client
    /// cannot be built
    pub async fn new(
        config: &Config,
        areas: Vec<Area>,
        scratch_dir: &Path,
        backend: Box<dyn ArchiveBackend>,
        mode: RunMode,
        options: PipelineOptions,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(scratch_dir).await?;
        tokio::fs::create_dir_all(&config.processed_dir).await?;
        let scratch_dir = tokio::fs::canonicalize(scratch_dir).await?;

        let fits_extension = detect_fits_extension(&config.camera_dir);
        let namer = ArchiveNamer::new(&config.prefix, &config.postfix, backend.extension());
        let relocator = Relocator::with_policy(&config.processed_dir, options.relocation);
        let uploader = Uploader::new(
            config.server.trim(),
            config.credentials(),
            UploadThrottle::new(options.upload_interval),
        )?;

        let pipeline = Self {
            areas,
            camera_dir: config.camera_dir.clone(),
            scratch_dir,
            batch_size: config.batch_size,
            scan_interval: config.effective_interval(),
            fits_extension,
            backend,
            namer,
            relocator,
            uploader,
            mode,
            options,
            state: DeliveryState::new(),
        };
        pipeline.log_startup_summary(config);

        Ok(pipeline)
    }

    fn log_startup_summary(&self, config: &Config) {
        info!(mode = %self.mode, "astrocam starting");
        if self.mode.is_test() {
            info!(
                idle_timeout_secs = self.options.idle_timeout.as_secs(),
                "test mode: errors are fatal, exits after idle timeout"
            );
        }

        if config.requested_interval != self.scan_interval {
            info!(
                requested_secs = config.requested_interval.as_secs(),
                minimum_secs = MIN_INTERVAL.as_secs(),
                using_secs = self.scan_interval.as_secs(),
                "scan interval adjusted"
            );
        } else {
            info!(
                interval_secs = self.scan_interval.as_secs(),
                minimum_secs = MIN_INTERVAL.as_secs(),
                "scan interval"
            );
        }

        info!(
            batch_size = self.batch_size,
            areas = self.areas.len(),
            camera_dir = %self.camera_dir.display(),
            processed_dir = %self.relocator.processed_dir().display(),
            scratch_dir = %self.scratch_dir.display(),
            "directories and batching"
        );
        info!(
            archive_mode = %config.archive_mode,
            archive_format = %self.backend.describe(),
            fits_extension = self.fits_extension,
            "archive settings"
        );

        match config.credentials() {
            Some((username, _)) => info!(username, "authentication enabled"),
            None => info!("authentication disabled (no credentials provided)"),
        }
    }

    /// Run one scan: re-deliver leftovers, then pack and deliver new batches
    ///
    /// # Errors
    /// In test mode the first archive, relocation or delivery failure is
    /// returned. In normal mode those are logged and the scan continues.
    pub async fn run_iteration(&mut self) -> Result<IterationSummary> {
        info!(scratch_dir = %self.scratch_dir.display(), "scanning scratch directory");
        let redelivered = self.redeliver_pending().await?;

        info!(camera_dir = %self.camera_dir.display(), "scanning camera directory");
        let scan = self.scan_areas().await?;
        // Idle period restarts after the scan, throttle waits included
        if scan.found_batch {
            self.state.mark_active();
        }

        Ok(IterationSummary {
            redelivered,
            archived: scan.archived,
            uploaded: scan.uploaded,
        })
    }

    /// Whether test mode has been idle for longer than the idle timeout
    pub fn idle_timed_out(&self) -> bool {
        self.mode.is_test() && self.state.idle_for() > self.options.idle_timeout
    }

    /// Scan immediately, then once per scan interval, until `shutdown`
    /// resolves or the test-mode idle timeout is reached
    ///
    /// A pending shutdown wins over a due scan; no final scan runs on
    /// shutdown. A scan in progress is never interrupted.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown signal received, stopping");
                    return Ok(RunOutcome::Shutdown);
                }
                _ = ticker.tick() => {}
            }

            let summary = self.run_iteration().await?;
            if summary != IterationSummary::default() {
                info!(
                    redelivered = summary.redelivered,
                    archived = summary.archived,
                    uploaded = summary.uploaded,
                    "scan complete"
                );
            }

            if self.idle_timed_out() {
                info!(
                    idle_timeout_secs = self.options.idle_timeout.as_secs(),
                    "test timeout: no new images found, exiting"
                );
                return Ok(RunOutcome::IdleTimeout);
            }
        }
    }

    /// Apply the run-mode policy to a stage failure
    ///
    /// Test mode turns the failure into the returned error; normal mode logs
    /// it and lets the caller carry on.
    fn tolerate(&self, stage: &'static str, err: Error) -> Result<()> {
        if self.mode.is_test() {
            error!(stage, error = %err, "fatal error in test mode");
            return Err(err);
        }
        warn!(stage, error = %err, "stage failed, continuing");
        Ok(())
    }
}
