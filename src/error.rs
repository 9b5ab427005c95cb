//! Error types for astrocam
//!
//! One crate-wide [`Error`] with nested enums for the two pipeline stages whose
//! failures carry the most context: archiving ([`ArchiveError`]) and delivery
//! ([`DeliveryError`]). Every variant names the file or directory involved so a
//! log line alone is enough to find the offending artifact on disk.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for astrocam operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for astrocam
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "SAI_COUNT")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error outside of an upload attempt (client construction)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A directory could not be listed while looking for files
    #[error("could not read directory {dir}: {source}")]
    Discovery {
        /// The directory that could not be read
        dir: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Archive creation or integrity testing failed
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Some source files could not be moved into the processed directory
    #[error("failed to relocate {} file(s) after {attempts} attempt(s)", failed.len())]
    Relocation {
        /// Files still sitting in the camera directory
        failed: Vec<PathBuf>,
        /// Number of attempts made
        attempts: u32,
    },

    /// Upload of an archive failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// External tool could not be executed (rar missing, not executable, ...)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

/// Archive creation and verification errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive could not be written
    #[error("failed to create {archive}: {reason}")]
    CreationFailed {
        /// The archive being written
        archive: PathBuf,
        /// Why creation failed (tool output, I/O error, ...)
        reason: String,
    },

    /// The archive was written but does not pass its self-test
    #[error("integrity test failed for {archive}: {reason}")]
    IntegrityFailed {
        /// The archive that failed verification
        archive: PathBuf,
        /// Why verification failed
        reason: String,
    },
}

/// Upload errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The archive could not be read for upload
    #[error("failed to read {archive} for upload: {source}")]
    ReadFailed {
        /// The archive that was going to be uploaded
        archive: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The request never produced an HTTP response (connect, timeout, ...)
    #[error("upload of {archive} failed: {source}")]
    Transport {
        /// The archive being uploaded
        archive: PathBuf,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status
    #[error("server returned status {status} for {archive}: {reason}")]
    Rejected {
        /// The archive being uploaded
        archive: PathBuf,
        /// HTTP status code
        status: u16,
        /// Response body excerpt, or the canonical reason phrase when empty
        reason: String,
    },
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
