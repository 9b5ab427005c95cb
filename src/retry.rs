//! Bounded retry over a set of items
//!
//! Runs an operation on every item, then re-runs it only on the items that
//! failed, waiting a fixed delay between rounds, until everything succeeded or
//! the attempt budget is spent. Used for relocating batch files, where one
//! locked file must not hold back the rest of the batch.
//!
//! # Example
//!
//! ```no_run
//! use astrocam::retry::{RetryPolicy, retry_failed};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::fixed(2, Duration::from_secs(3));
//! let report = retry_failed(&policy, vec![1, 2, 3], |n| async move {
//!     if n % 2 == 0 { Err(format!("{n} is busy")) } else { Ok(()) }
//! })
//! .await;
//! assert_eq!(report.failed.len(), 1);
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

/// How many rounds to run and how long to wait between them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of rounds, including the first (minimum 1)
    pub max_attempts: u32,
    /// Fixed delay before each retry round
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy with a fixed delay between rounds
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(2, Duration::from_secs(3))
    }
}

/// What is left after the retry budget is spent
#[must_use]
#[derive(Debug)]
pub struct RetryReport<T, E> {
    /// Items that still failed in the last round, with their last error
    pub failed: Vec<(T, E)>,
    /// Rounds actually run
    pub attempts: u32,
}

impl<T, E> RetryReport<T, E> {
    /// True when every item eventually succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `operation` on every item, retrying only the failed subset
///
/// Failures never stop the current round: every pending item is attempted
/// once per round. Sleeps use the tokio clock, so tests can run with a paused
/// clock or a zero delay.
pub async fn retry_failed<T, E, F, Fut>(
    policy: &RetryPolicy,
    items: Vec<T>,
    mut operation: F,
) -> RetryReport<T, E>
where
    T: Clone,
    E: std::fmt::Display,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut pending = items;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let mut failed = Vec::new();
        for item in pending {
            if let Err(e) = operation(item.clone()).await {
                tracing::warn!(error = %e, attempt, max_attempts, "operation failed");
                failed.push((item, e));
            }
        }

        if failed.is_empty() {
            if attempt > 1 {
                tracing::info!(attempts = attempt, "all items succeeded after retry");
            }
            return RetryReport {
                failed,
                attempts: attempt,
            };
        }

        if attempt >= max_attempts {
            tracing::error!(
                failed = failed.len(),
                attempts = attempt,
                "items still failing after all retry attempts exhausted"
            );
            return RetryReport {
                failed,
                attempts: attempt,
            };
        }

        tracing::info!(
            failed = failed.len(),
            delay_ms = policy.delay.as_millis(),
            "waiting before retrying failed items"
        );
        tokio::time::sleep(policy.delay).await;

        pending = failed.into_iter().map(|(item, _)| item).collect();
    }
}
