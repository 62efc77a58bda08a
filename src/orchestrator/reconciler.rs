//! Merge of partial status updates into the current snapshot.
//!
//! Updates carry no sequence number, so whichever channel delivers last
//! wins: a slow pull response can overwrite a fresher push update.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::models::status::{JobStatus, StatusSnapshot, StatusUpdate};

/// Merge `update` into `current`, replacing only the fields it provides.
///
/// `progress` is clamped to `0..=100`. `error_message` survives only when
/// the merged status is `Failed`.
#[must_use]
pub fn merge(current: &StatusSnapshot, update: &StatusUpdate) -> StatusSnapshot {
    let mut next = current.clone();

    if let Some(status) = update.status {
        next.status = status;
    }
    if let Some(progress) = update.progress {
        next.progress = u8::try_from(progress.clamp(0, 100)).unwrap_or(100);
    }
    if let Some(total) = update.total_rows {
        next.total_rows = Some(total);
    }
    if let Some(processed) = update.processed_rows {
        next.processed_rows = Some(processed);
    }
    if let Some(eta) = update.eta_seconds {
        next.eta_seconds = Some(eta);
    }

    if next.status == JobStatus::Failed {
        if let Some(ref message) = update.error_message {
            next.error_message = Some(message.clone());
        }
    } else {
        next.error_message = None;
    }

    next
}

/// Owns the session's snapshot and the time of the last accepted update.
#[derive(Debug)]
pub struct Reconciler {
    snapshot: StatusSnapshot,
    last_update: Instant,
    last_update_at: Option<DateTime<Utc>>,
}

impl Reconciler {
    /// Start from an `Unknown` snapshot; `started` is the stall reference
    /// until the first update lands.
    #[must_use]
    pub fn new(started: Instant) -> Self {
        Self {
            snapshot: StatusSnapshot::default(),
            last_update: started,
            last_update_at: None,
        }
    }

    /// Merge an update and record `now` as the last-update time.
    pub fn apply(&mut self, update: &StatusUpdate, now: Instant) -> &StatusSnapshot {
        self.snapshot = merge(&self.snapshot, update);
        self.last_update = now;
        self.last_update_at = Some(Utc::now());
        &self.snapshot
    }

    /// Current merged snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Monotonic time of the last accepted update.
    #[must_use]
    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Wall-clock time of the last accepted update.
    #[must_use]
    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.last_update_at
    }
}
