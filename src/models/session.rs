//! Caller-visible session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::StatusSnapshot;

/// Phase of a sync session's channel state machine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Push channel opening; no update received yet.
    #[default]
    Connecting,
    /// Updates flowing over the push channel only.
    LivePushOnly,
    /// Pull fallback loop running alongside the push channel.
    LivePushAndFallback,
    /// Absorbing state: job finished or session cancelled.
    Terminated,
}

impl SessionPhase {
    /// Whether the fallback loop is active in this phase.
    #[must_use]
    pub fn has_fallback(self) -> bool {
        self == Self::LivePushAndFallback
    }
}

/// Snapshot plus channel bookkeeping published to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionView {
    /// Current state machine phase.
    pub phase: SessionPhase,
    /// Merged job status.
    pub snapshot: StatusSnapshot,
    /// Wall-clock time of the last accepted update.
    pub last_update_at: Option<DateTime<Utc>>,
    /// Updates accepted from the push channel.
    pub push_updates: u64,
    /// Updates accepted from the pull channel.
    pub pull_updates: u64,
}

impl SessionView {
    /// Whether the session has reached the absorbing state.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.phase == SessionPhase::Terminated
    }
}
