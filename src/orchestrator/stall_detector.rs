//! Push-channel stall detection.
//!
//! The detector owns the session's stall-check [`Interval`]. On every tick
//! the session asks [`StallDetector::is_stalled`] whether a `processing`
//! job has gone quiet for longer than the threshold. The detector never
//! stops the fallback loop; only session teardown does.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::models::status::JobStatus;

/// Per-session stall check timer and threshold.
#[derive(Debug)]
pub struct StallDetector {
    threshold: Duration,
    ticker: Interval,
}

impl StallDetector {
    /// Create a detector whose first check fires one `check_every` after `start`.
    #[must_use]
    pub fn new(check_every: Duration, threshold: Duration, start: Instant) -> Self {
        let mut ticker = interval_at(start + check_every, check_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { threshold, ticker }
    }

    /// Wait for the next scheduled check.
    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }

    /// Configured silence threshold.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Whether a job in `status` whose last update landed at `last_update`
    /// counts as stalled at `now`.
    ///
    /// Only `Processing` jobs can stall: a pending job has not started and
    /// terminal or unknown jobs have nothing left to report.
    #[must_use]
    pub fn is_stalled(&self, status: JobStatus, last_update: Instant, now: Instant) -> bool {
        status == JobStatus::Processing
            && now.saturating_duration_since(last_update) > self.threshold
    }
}
