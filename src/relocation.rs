//! Moving archived camera files into the processed directory

use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, retry_failed};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Moves batch source files into the processed directory with bounded retry
#[derive(Clone, Debug)]
pub struct Relocator {
    processed_dir: PathBuf,
    policy: RetryPolicy,
}

impl Relocator {
    /// Relocator with the default policy (2 attempts, 3 second backoff)
    pub fn new(processed_dir: impl Into<PathBuf>) -> Self {
        Self::with_policy(processed_dir, RetryPolicy::default())
    }

    /// Relocator with an explicit retry policy
    pub fn with_policy(processed_dir: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            policy,
        }
    }

    /// Destination directory
    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Move every file into the processed directory
    ///
    /// A file whose basename already exists in the processed directory is
    /// deleted instead of moved. One failing file never stops the others;
    /// the failed subset is retried per the policy and whatever is left is
    /// returned as [`Error::Relocation`].
    pub async fn relocate(&self, files: &[PathBuf]) -> Result<()> {
        let processed_dir = self.processed_dir.as_path();
        let report = retry_failed(&self.policy, files.to_vec(), |source| async move {
            move_one(&source, processed_dir).await
        })
        .await;

        if report.is_success() {
            info!(
                files = files.len(),
                processed_dir = %processed_dir.display(),
                "relocated batch files"
            );
            return Ok(());
        }

        Err(Error::Relocation {
            failed: report.failed.into_iter().map(|(path, _)| path).collect(),
            attempts: report.attempts,
        })
    }
}

async fn move_one(source: &Path, processed_dir: &Path) -> io::Result<()> {
    let file_name = source
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{} has no file name", source.display())))?;
    let destination = processed_dir.join(file_name);

    if tokio::fs::try_exists(&destination).await? {
        debug!(
            source = %source.display(),
            destination = %destination.display(),
            "already relocated, removing source"
        );
        return tokio::fs::remove_file(source).await;
    }

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        "moving file"
    );
    tokio::fs::rename(source, &destination).await
}
