//! Server-Sent Events codec for job event streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] and assembles `field: value`
//! lines into [`SseFrame`]s. A blank line dispatches the pending frame.
//!
//! | Line              | Effect                                   |
//! |-------------------|------------------------------------------|
//! | `data: …`         | appended to the frame's data (`\n`-joined) |
//! | `event: …`        | sets the frame's event name              |
//! | `: …`             | comment (keep-alive), ignored            |
//! | `id:` / `retry:`  | ignored                                  |
//! | *(blank)*         | dispatch if any `data` was seen          |
//!
//! Lines longer than [`MAX_LINE_BYTES`], and frames whose joined data
//! exceeds it, are discarded; the stream keeps going.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum accepted line length and frame data size: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type; [`DEFAULT_EVENT`] unless the frame set one.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Incremental SSE decoder.
#[derive(Debug)]
pub struct SseCodec {
    lines: LinesCodec,
    event: Option<String>,
    data: Option<String>,
    /// Set after an oversized line until the next blank line.
    discarding: bool,
}

impl SseCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            event: None,
            data: None,
            discarding: false,
        }
    }

    /// Feed one line; returns a frame when the line completes one.
    fn feed(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            let event = self.event.take();
            let data = self.data.take();
            if std::mem::take(&mut self.discarding) {
                return None;
            }
            return data.map(|data| SseFrame {
                event: event.unwrap_or_else(|| DEFAULT_EVENT.to_owned()),
                data,
            });
        }

        if self.discarding || line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                match self.data {
                    Some(ref mut data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_owned()),
                }
                if self.data.as_ref().is_some_and(|data| data.len() > MAX_LINE_BYTES) {
                    warn!(
                        limit = MAX_LINE_BYTES,
                        "sse codec: frame too large, dropping frame"
                    );
                    self.start_discarding();
                }
            }
            "event" => self.event = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    /// Drop the pending frame and skip lines until the next blank line.
    fn start_discarding(&mut self) {
        self.event = None;
        self.data = None;
        self.discarding = true;
    }

    fn on_line_error(&mut self, err: LinesCodecError) -> Result<()> {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                warn!(
                    limit = MAX_LINE_BYTES,
                    "sse codec: line too long, dropping frame"
                );
                self.start_discarding();
                Ok(())
            }
            LinesCodecError::Io(io_err) => Err(AppError::Stream(format!("read failed: {io_err}"))),
        }
    }
}

impl Default for SseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SseCodec {
    type Item = SseFrame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) => {
                    if let Some(frame) = self.feed(&line) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => return Ok(None),
                Err(err) => self.on_line_error(err)?,
            }
        }
    }

    /// An event left undispatched at EOF is dropped, as SSE requires.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) => {
                    if let Some(frame) = self.feed(&line) {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => {
                    self.event = None;
                    self.data = None;
                    return Ok(None);
                }
                Err(err) => self.on_line_error(err)?,
            }
        }
    }
}
