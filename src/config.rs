//! Client configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Environment variable that overrides [`SyncConfig::base_url`].
pub const BASE_URL_ENV: &str = "IMPORT_SYNC_BASE_URL";

/// Timer cadences for the sync session (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Interval between pull fetches once the fallback loop is running.
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
    /// Cadence at which the stall detector is consulted.
    #[serde(default = "default_stall_check_interval_ms")]
    pub stall_check_interval_ms: u64,
    /// Silence after which a processing job is considered stalled.
    #[serde(default = "default_stall_threshold_ms")]
    pub stall_threshold_ms: u64,
}

fn default_fallback_interval_ms() -> u64 {
    2000
}

fn default_stall_check_interval_ms() -> u64 {
    3000
}

fn default_stall_threshold_ms() -> u64 {
    5000
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_base_url() -> String {
    "http://localhost:8000/api".into()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fallback_interval_ms: default_fallback_interval_ms(),
            stall_check_interval_ms: default_stall_check_interval_ms(),
            stall_threshold_ms: default_stall_threshold_ms(),
        }
    }
}

impl TimingConfig {
    /// Fallback pull interval as a [`Duration`].
    #[must_use]
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms)
    }

    /// Stall check cadence as a [`Duration`].
    #[must_use]
    pub fn stall_check_interval(&self) -> Duration {
        Duration::from_millis(self.stall_check_interval_ms)
    }

    /// Stall threshold as a [`Duration`].
    #[must_use]
    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }
}

/// Top-level configuration parsed from `import-sync.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Base URL of the importer REST API (e.g. `http://host/api`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for a single pull request.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Session timer cadences.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            timing: TimingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the [`BASE_URL_ENV`] override, if set and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the overridden URL fails validation.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                debug!(base_url = %url, "base url overridden from environment");
                self.base_url = url;
                self.validate()?;
            }
        }
        Ok(())
    }

    /// Per-request timeout for pull fetches.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Validate field ranges and normalize the base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&mut self) -> Result<()> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(AppError::Config("base_url must not be empty".into()));
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "base_url must start with http:// or https://, got {trimmed}"
            )));
        }
        self.base_url = trimmed.to_owned();

        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        let timing = &self.timing;
        for (name, value) in [
            ("fallback_interval_ms", timing.fallback_interval_ms),
            ("stall_check_interval_ms", timing.stall_check_interval_ms),
            ("stall_threshold_ms", timing.stall_threshold_ms),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{name} must be greater than zero")));
            }
        }

        Ok(())
    }
}
