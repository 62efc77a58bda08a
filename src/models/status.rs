//! Job status model: the merged snapshot and the partial wire update.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a background import job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No update has been observed yet.
    #[default]
    Unknown,
    /// Job is queued and has not started processing.
    Pending,
    /// Job is processing rows.
    Processing,
    /// Job finished successfully.
    Completed,
    /// Job finished with an error.
    Failed,
}

impl JobStatus {
    /// Whether no further transitions are valid after this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial status payload received from either channel.
///
/// Every field is optional; a missing key and an explicit `null` both mean
/// "not provided". Unrecognised keys (`job_id`, `file_name`, timestamps) are
/// ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatusUpdate {
    /// Reported job status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// Reported percentage; clamped to `0..=100` when merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    /// Total rows found by the server's pre-scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    /// Rows processed so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_rows: Option<u64>,
    /// Failure description; only meaningful with `status = failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Estimated seconds remaining.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
}

impl StatusUpdate {
    /// An update carrying only a status.
    #[must_use]
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Set the progress percentage.
    #[must_use]
    pub fn progress(mut self, progress: i64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the total row count.
    #[must_use]
    pub fn total_rows(mut self, rows: u64) -> Self {
        self.total_rows = Some(rows);
        self
    }

    /// Set the processed row count.
    #[must_use]
    pub fn processed_rows(mut self, rows: u64) -> Self {
        self.processed_rows = Some(rows);
        self
    }

    /// Set the error message.
    #[must_use]
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Set the ETA.
    #[must_use]
    pub fn eta_seconds(mut self, seconds: u64) -> Self {
        self.eta_seconds = Some(seconds);
        self
    }

    /// Whether the update carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merged, caller-facing view of one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StatusSnapshot {
    /// Last known status; `Unknown` only before the first update.
    pub status: JobStatus,
    /// Display percentage in `0..=100`; not assumed monotonic.
    pub progress: u8,
    /// Absent until the server has scanned the file.
    pub total_rows: Option<u64>,
    /// Rows processed so far.
    pub processed_rows: Option<u64>,
    /// Present only when `status` is `Failed`.
    pub error_message: Option<String>,
    /// Advisory time remaining.
    pub eta_seconds: Option<u64>,
}

impl StatusSnapshot {
    /// Whether the snapshot's status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
