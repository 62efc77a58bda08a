//! HTTP pull channel: one `GET /jobs/{id}` per fetch.

use std::future::Future;
use std::pin::Pin;

use super::client::JobsClient;
use super::PullSource;
use crate::models::status::StatusUpdate;
use crate::Result;

/// [`PullSource`] backed by the importer's job status endpoint.
#[derive(Debug, Clone)]
pub struct HttpPullSource {
    client: JobsClient,
}

impl HttpPullSource {
    /// Wrap a jobs client.
    #[must_use]
    pub fn new(client: JobsClient) -> Self {
        Self { client }
    }
}

impl PullSource for HttpPullSource {
    fn fetch(&self, job_id: &str) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>> {
        let job_id = job_id.to_owned();
        Box::pin(async move { self.client.fetch_status(&job_id).await })
    }
}
