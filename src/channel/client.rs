//! HTTP client for the importer's job endpoints.

use std::time::Duration;

use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Response, StatusCode};
use tracing::debug;

use crate::config::SyncConfig;
use crate::models::status::StatusUpdate;
use crate::{AppError, Result};

/// Maximum accepted job id length.
const MAX_JOB_ID_LEN: usize = 255;

/// Reject job ids that are empty or would need escaping in a URL path.
///
/// Server ids are UUIDs or task ids: ASCII alphanumerics, `-` and `_`.
///
/// # Errors
///
/// Returns `AppError::InvalidJobId` describing the problem.
pub fn validate_job_id(job_id: &str) -> Result<()> {
    if job_id.is_empty() {
        return Err(AppError::InvalidJobId("job id must not be empty".into()));
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(AppError::InvalidJobId(format!(
            "job id longer than {MAX_JOB_ID_LEN} bytes"
        )));
    }
    if let Some(bad) = job_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(AppError::InvalidJobId(format!(
            "unexpected character {bad:?} in {job_id}"
        )));
    }
    Ok(())
}

/// Thin wrapper over [`reqwest::Client`] bound to one API base URL.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct JobsClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl JobsClient {
    /// Build a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the underlying HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Http(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            request_timeout: config.request_timeout(),
        })
    }

    /// API base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET` endpoint returning the job's current status.
    #[must_use]
    pub fn status_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{job_id}", self.base_url)
    }

    /// SSE endpoint streaming the job's status events.
    #[must_use]
    pub fn events_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{job_id}/events", self.base_url)
    }

    /// `POST` endpoint asking the server to abort the job.
    #[must_use]
    pub fn cancel_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{job_id}/cancel", self.base_url)
    }

    /// Fetch the job's current status.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidJobId` if `job_id` fails [`validate_job_id`].
    /// - `AppError::NotFound` on `404`.
    /// - `AppError::Http` on transport failure, timeout, or other non-success status.
    /// - `AppError::Parse` if the body is not a status object or lacks `status`.
    pub async fn fetch_status(&self, job_id: &str) -> Result<StatusUpdate> {
        validate_job_id(job_id)?;
        let url = self.status_url(job_id);
        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| AppError::Http(format!("status request failed: {err}")))?;
        let response = check_status(response, job_id)?;

        let update: StatusUpdate = response
            .json()
            .await
            .map_err(|err| AppError::Parse(format!("invalid status body: {err}")))?;
        if update.status.is_none() {
            return Err(AppError::Parse("status response missing `status`".into()));
        }

        debug!(job_id, status = ?update.status, "pulled job status");
        Ok(update)
    }

    /// Open the job's SSE stream and return the streaming response.
    ///
    /// No overall timeout is applied; the stream lives until the server
    /// closes it or the caller drops the response.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidJobId` if `job_id` fails [`validate_job_id`].
    /// - `AppError::NotFound` on `404`.
    /// - `AppError::Http` on connect failure or other non-success status.
    pub async fn open_event_stream(&self, job_id: &str) -> Result<Response> {
        validate_job_id(job_id)?;
        let url = self.events_url(job_id);
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|err| AppError::Http(format!("event stream request failed: {err}")))?;
        check_status(response, job_id)
    }

    /// Ask the server to cancel the job.
    ///
    /// This only reaches the server; the caller must also stop its local
    /// sync session.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidJobId` if `job_id` fails [`validate_job_id`].
    /// - `AppError::NotFound` on `404`.
    /// - `AppError::Http` on transport failure or other non-success status.
    pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
        validate_job_id(job_id)?;
        let url = self.cancel_url(job_id);
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| AppError::Http(format!("cancel request failed: {err}")))?;
        check_status(response, job_id)?;
        debug!(job_id, "cancel request accepted");
        Ok(())
    }
}

fn check_status(response: Response, job_id: &str) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("job {job_id} not found"))),
        status => Err(AppError::Http(format!(
            "unexpected status {status} from {}",
            response.url()
        ))),
    }
}
