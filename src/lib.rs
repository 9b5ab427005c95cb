//! # astrocam
//!
//! Ships images from an observatory camera to a collection server.
//!
//! The camera drops FITS files into a directory. For every configured sky
//! area, astrocam waits until a full batch of that area's files is present,
//! packs the batch into one archive, moves the originals to a processed
//! directory and uploads the archive over HTTP. Archives whose upload fails
//! stay in a scratch directory and are retried at the start of every scan.
//!
//! ## Quick Start
//!
//! ```no_run
//! use astrocam::{Config, Pipeline, PipelineOptions, RunMode, run_with_shutdown};
//! use astrocam::archive::select_backend;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let base = Path::new("/opt/astrocam");
//!     let mut config = Config::with_base_dir(base);
//!     config.server = "https://example.org/upload".to_string();
//!     config.validate()?;
//!
//!     let mut pipeline = Pipeline::new(
//!         &config,
//!         vec!["064".into(), "M31".into()],
//!         &base.join("temp"),
//!         select_backend(config.archive_mode),
//!         RunMode::Normal,
//!         PipelineOptions::default(),
//!     )
//!     .await?;
//!
//!     run_with_shutdown(&mut pipeline).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive creation and verification backends
pub mod archive;
/// Configuration loading and validation
pub mod config;
/// Error types
pub mod error;
/// Area file discovery and batch selection
pub mod locator;
/// Archive naming and chronological ordering
pub mod naming;
/// Scan loop driving discovery, archiving, relocation and delivery
pub mod pipeline;
/// Relocation of archived source files
pub mod relocation;
/// Bounded retry over a set of items
pub mod retry;
/// Upload throttling and delivery state
pub mod throttle;
/// Core types
pub mod types;
/// HTTP upload of archives
pub mod upload;

// Re-export commonly used types
pub use archive::{ArchiveBackend, RarArchiver, ZipArchiver};
pub use config::{ArchiveMode, Config};
pub use error::{ArchiveError, DeliveryError, Error, Result};
pub use naming::ArchiveNamer;
pub use pipeline::{IterationSummary, Pipeline, PipelineOptions, RunOutcome};
pub use relocation::Relocator;
pub use throttle::{DeliveryState, UploadThrottle};
pub use types::{Area, ArchiveFormat, BatchEntry, FileBatch, RunMode};
pub use upload::Uploader;

/// Run the pipeline until a termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// In test mode the pipeline may also stop on its own after the idle timeout;
/// the returned [`RunOutcome`] says which happened.
pub async fn run_with_shutdown(pipeline: &mut Pipeline) -> Result<RunOutcome> {
    pipeline.run(wait_for_signal()).await
}

/// Resolve once the operator asks the daemon to stop
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handlers can be unavailable in containers; fall back to what registers
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut term), Ok(mut int)) => {
            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "stop requested");
        }
        (Err(e), Ok(mut int)) => {
            tracing::warn!(error = %e, "SIGTERM unavailable, stop with Ctrl+C");
            int.recv().await;
            tracing::info!(signal = "SIGINT", "stop requested");
        }
        (Ok(mut term), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT unavailable, stop with SIGTERM");
            term.recv().await;
            tracing::info!(signal = "SIGTERM", "stop requested");
        }
        (Err(term_err), Err(int_err)) => {
            tracing::error!(
                sigterm_error = %term_err,
                sigint_error = %int_err,
                "no signal handlers, falling back to Ctrl+C"
            );
            ctrl_c_or_wait().await;
        }
    }
}

/// Resolve once the operator asks the daemon to stop
#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_wait().await;
}

/// Ctrl+C, or never when even that cannot be watched
async fn ctrl_c_or_wait() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "Ctrl+C", "stop requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot watch Ctrl+C, stop the process externally");
            std::future::pending::<()>().await;
        }
    }
}
