//! SSE push channel.
//!
//! Opens `GET /jobs/{id}/events`, frames the body with [`SseCodec`], parses
//! each frame, and forwards the results through a tokio [`mpsc`] channel
//! wrapped in a [`PushChannel`].
//!
//! # Frame handling
//!
//! | Frame                                   | Outcome                         |
//! |-----------------------------------------|---------------------------------|
//! | `message` with a status object          | [`PushEvent::Update`]           |
//! | `message` with an `error` key           | [`PushEvent::Fault`], stream ends |
//! | `close`                                 | stream ends, no event           |
//! | unknown event name                      | skipped; logged at `DEBUG`      |
//! | malformed `message` payload             | skipped; logged at `WARN`       |
//!
//! EOF or an I/O error without a preceding `close` frame is a fault.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::client::JobsClient;
use super::codec::{SseCodec, SseFrame, DEFAULT_EVENT};
use super::{PushChannel, PushEvent, PushSource};
use crate::models::status::StatusUpdate;
use crate::{AppError, Result};

/// Buffered events between the transport task and the session.
const EVENT_BUFFER: usize = 64;

/// Event name the server uses after the final status frame.
pub const CLOSE_EVENT: &str = "close";

/// What a single SSE frame means for the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Deliver this event to the consumer.
    Event(PushEvent),
    /// Server signalled the end of the stream.
    Closed,
    /// Nothing to deliver.
    Ignored,
}

/// Interpret one SSE frame.
///
/// # Errors
///
/// Returns `AppError::Parse` when a `message` frame's data is not a JSON
/// object or does not decode as a [`StatusUpdate`].
pub fn parse_frame(frame: &SseFrame) -> Result<FrameOutcome> {
    match frame.event.as_str() {
        CLOSE_EVENT => Ok(FrameOutcome::Closed),
        DEFAULT_EVENT => parse_message(&frame.data).map(FrameOutcome::Event),
        other => {
            debug!(event = other, "push channel: skipping unknown event type");
            Ok(FrameOutcome::Ignored)
        }
    }
}

fn parse_message(data: &str) -> Result<PushEvent> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| AppError::Parse(format!("malformed json: {e}")))?;

    let serde_json::Value::Object(ref object) = value else {
        return Err(AppError::Parse("event payload is not an object".into()));
    };

    if let Some(error) = object.get("error") {
        let reason = error.as_str().map_or_else(|| error.to_string(), str::to_owned);
        return Ok(PushEvent::Fault(format!("server error: {reason}")));
    }

    let update: StatusUpdate = serde_json::from_value(value)
        .map_err(|e| AppError::Parse(format!("invalid status payload: {e}")))?;
    Ok(PushEvent::Update(update))
}

/// [`PushSource`] backed by the importer's SSE endpoint.
#[derive(Debug, Clone)]
pub struct HttpPushSource {
    client: JobsClient,
}

impl HttpPushSource {
    /// Wrap a jobs client.
    #[must_use]
    pub fn new(client: JobsClient) -> Self {
        Self { client }
    }
}

impl PushSource for HttpPushSource {
    fn open(&self, job_id: &str) -> PushChannel {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        tokio::spawn(
            run_event_stream(
                job_id.to_owned(),
                self.client.clone(),
                event_tx,
                cancel.clone(),
            )
            .instrument(info_span!("push_channel", job_id)),
        );

        PushChannel::new(event_rx, cancel)
    }
}

/// Transport task: connect, decode frames, forward events until the stream
/// ends, a fault occurs, or `cancel` fires.
///
/// Cancellation exits silently; every other exit path that is not a
/// server `close` frame emits exactly one [`PushEvent::Fault`].
pub async fn run_event_stream(
    job_id: String,
    client: JobsClient,
    event_tx: mpsc::Sender<PushEvent>,
    cancel: CancellationToken,
) {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        response = client.open_event_stream(&job_id) => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            warn!(job_id, error = %err, "push channel: connect failed");
            send_fault(&event_tx, &job_id, format!("connect failed: {err}")).await;
            return;
        }
    };
    debug!(job_id, "push channel: stream open");

    let body = StreamReader::new(Box::pin(
        response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other)),
    ));
    let mut framed = FramedRead::new(body, SseCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(job_id, "push channel: closed by consumer");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(job_id, "push channel: EOF without close event");
                        send_fault(&event_tx, &job_id, "stream closed by server".into()).await;
                        break;
                    }

                    Some(Err(err)) => {
                        warn!(job_id, error = %err, "push channel: stream error");
                        send_fault(&event_tx, &job_id, format!("stream error: {err}")).await;
                        break;
                    }

                    Some(Ok(frame)) => match parse_frame(&frame) {
                        Ok(FrameOutcome::Event(event)) => {
                            let is_fault = matches!(event, PushEvent::Fault(_));
                            if event_tx.send(event).await.is_err() {
                                debug!(job_id, "push channel: consumer gone, stopping");
                                break;
                            }
                            if is_fault {
                                break;
                            }
                        }
                        Ok(FrameOutcome::Closed) => {
                            debug!(job_id, "push channel: server closed stream");
                            break;
                        }
                        Ok(FrameOutcome::Ignored) => {}
                        Err(err) => {
                            warn!(
                                job_id,
                                error = %err,
                                raw_data = %frame.data,
                                "push channel: malformed event, skipping"
                            );
                        }
                    },
                }
            }
        }
    }
}

async fn send_fault(event_tx: &mpsc::Sender<PushEvent>, job_id: &str, reason: String) {
    if event_tx.send(PushEvent::Fault(reason)).await.is_err() {
        debug!(job_id, "push channel: consumer gone before fault could be delivered");
    }
}
