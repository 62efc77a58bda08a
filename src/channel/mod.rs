//! Push and pull channel abstractions.
//!
//! The session talks to the server through two seams:
//!
//! | Seam           | Shape                                   | HTTP implementation |
//! |----------------|-----------------------------------------|---------------------|
//! | [`PushSource`] | long-lived stream of [`PushEvent`]s     | [`push::HttpPushSource`] (SSE) |
//! | [`PullSource`] | one request, one [`StatusUpdate`]       | [`pull::HttpPullSource`] (JSON GET) |
//!
//! Neither seam retries. Recovery is the session's job.

pub mod client;
pub mod codec;
pub mod pull;
pub mod push;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::status::StatusUpdate;
use crate::Result;

/// Message delivered by a push channel to its single consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A parsed partial status update.
    Update(StatusUpdate),
    /// The stream failed, could not be established, or ended unexpectedly.
    /// No further events follow a fault.
    Fault(String),
}

/// Consumer end of a one-way job event stream.
///
/// The producer (a transport task) holds the matching `mpsc::Sender` and a
/// clone of the cancellation token. [`close`](Self::close) cancels the
/// producer and stops delivery; calling it again is a no-op.
#[derive(Debug)]
pub struct PushChannel {
    events: mpsc::Receiver<PushEvent>,
    cancel: CancellationToken,
    closed: bool,
}

impl PushChannel {
    /// Wrap a producer's receiver and cancellation token.
    #[must_use]
    pub fn new(events: mpsc::Receiver<PushEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            cancel,
            closed: false,
        }
    }

    /// Receive the next event, or `None` once the channel is closed or the
    /// producer has gone away.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    /// Close the channel and signal the producer to stop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.events.close();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens push channels keyed by job id.
pub trait PushSource: Send + Sync {
    /// Start a subscription to `job_id`'s event stream.
    ///
    /// Connection failures are reported as [`PushEvent::Fault`] on the
    /// returned channel, not as an error here. Must be called from within a
    /// tokio runtime.
    fn open(&self, job_id: &str) -> PushChannel;
}

/// Point-in-time status fetches keyed by job id.
pub trait PullSource: Send + Sync {
    /// Fetch the job's current full status.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`](crate::AppError) on transport failure,
    /// non-success response, or an undecodable body.
    fn fetch(&self, job_id: &str) -> Pin<Box<dyn Future<Output = Result<StatusUpdate>> + Send + '_>>;
}
