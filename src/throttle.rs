//! Upload throttling
//!
//! Consecutive upload attempts are spaced at least [`MIN_UPLOAD_INTERVAL`]
//! apart, measured from the start of one attempt to the start of the next.
//! The first attempt of the process is never delayed. Time comes from the
//! tokio clock so tests can run under a paused clock.

use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Minimum spacing between the starts of two upload attempts
pub const MIN_UPLOAD_INTERVAL: Duration = Duration::from_secs(120);

/// Mutable delivery bookkeeping owned by the pipeline controller
#[derive(Clone, Copy, Debug)]
pub struct DeliveryState {
    /// Start of the most recent upload attempt, if any
    pub last_upload_attempt: Option<Instant>,
    /// Start of the current period without new batches (test mode)
    pub idle_since: Instant,
}

impl DeliveryState {
    /// Fresh state: nothing uploaded yet, idle since now
    pub fn new() -> Self {
        Self {
            last_upload_attempt: None,
            idle_since: Instant::now(),
        }
    }

    /// Restart the idle period
    pub fn mark_active(&mut self) {
        self.idle_since = Instant::now();
    }

    /// Time elapsed since the idle period started
    pub fn idle_for(&self) -> Duration {
        self.idle_since.elapsed()
    }
}

impl Default for DeliveryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Enforces the minimum spacing between upload attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadThrottle {
    min_interval: Duration,
}

impl UploadThrottle {
    /// Throttle with a custom spacing (zero disables throttling)
    pub const fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// How long the next attempt has to wait
    pub fn remaining(&self, state: &DeliveryState) -> Duration {
        match state.last_upload_attempt {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Wait until the next attempt is allowed, then record its start
    ///
    /// The start is recorded before the caller touches the network, so a
    /// failed attempt counts toward the spacing as much as a successful one.
    pub async fn wait(&self, state: &mut DeliveryState) {
        let remaining = self.remaining(state);
        if !remaining.is_zero() {
            info!(
                wait_secs = remaining.as_secs(),
                "throttling upload, waiting before next attempt"
            );
            tokio::time::sleep(remaining).await;
        }
        state.last_upload_attempt = Some(Instant::now());
    }
}

impl Default for UploadThrottle {
    fn default() -> Self {
        Self::new(MIN_UPLOAD_INTERVAL)
    }
}
