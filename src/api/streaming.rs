//! Streaming Support
//!
//! Incremental Server-Sent Events (SSE) parsing for streamed chat
//! completions.
//!
//! Bytes arrive from the transport in arbitrary chunks. [`SseDecoder`]
//! reassembles them into lines and frames, and [`EventStream`] turns each
//! frame into a [`StreamEvent`]:
//!
//! ```text
//! AwaitingFrame -> FrameBuffering -> (emit | skip) -> AwaitingFrame
//!                                 \-> Done    on `[DONE]` or connection close
//!                                 \-> Failed  on transport error
//! ```

use crate::api::completion::{null_as_default, ChatMessage, FinishReason, Role, Usage};
use crate::error::{ApertusError, Result};
use bytes::Bytes;
use futures::stream::{FusedStream, Stream};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Payload that marks the clean end of a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A streaming chunk from the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Choices with deltas
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChunkChoice>,

    /// Usage info (only in the final chunk, when the server sends it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A choice in a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,

    /// The delta (partial message), empty when the server sends `null`
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: ChunkDelta,

    /// Finish reason (set in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Delta content in a streaming chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role (usually only in the first chunk). Unknown roles are kept as
    /// [`Role::Other`] so the frame's content is not lost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One parsed stream frame
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Text fragment contributed by the first choice
    pub delta: Option<String>,

    /// Set on the frame that ends the first choice
    pub finish_reason: Option<FinishReason>,

    /// Token usage, if the frame carried it
    pub usage: Option<Usage>,

    /// Index of the choice the delta belongs to
    pub choice_index: u32,

    /// The decoded chunk
    pub raw: Option<ChatCompletionChunk>,
}

impl StreamEvent {
    /// Build an event from a decoded chunk
    pub fn from_chunk(chunk: ChatCompletionChunk) -> Self {
        let first = chunk.choices.first();

        Self {
            delta: first.and_then(|c| c.delta.content.clone()),
            finish_reason: first.and_then(|c| c.finish_reason.clone()),
            usage: chunk.usage,
            choice_index: first.map(|c| c.index).unwrap_or(0),
            raw: Some(chunk),
        }
    }
}

/// A complete SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Data lines of one event, joined with `\n`
    Data(String),

    /// The `[DONE]` sentinel
    Done,
}

/// Incremental SSE decoder.
///
/// Holds at most one partial line and the data lines of one unfinished
/// frame between calls to [`feed`](SseDecoder::feed). A frame is emitted
/// as soon as its data forms a complete JSON value, so servers that omit
/// the blank line between events still stream one event per line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a partial line or an unfinished frame is held
    pub fn is_buffering(&self) -> bool {
        !self.line.is_empty() || self.data.is_some()
    }

    /// Consume a chunk of bytes, returning every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.line.extend_from_slice(&rest[..pos]);
            let line = std::mem::take(&mut self.line);
            self.process_line(&line, &mut frames);
            rest = &rest[pos + 1..];
        }
        self.line.extend_from_slice(rest);

        frames
    }

    /// Flush whatever is buffered once the transport has closed
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.process_line(&line, &mut frames);
        }
        if let Some(data) = self.data.take() {
            frames.push(SseFrame::Data(data));
        }

        frames
    }

    fn process_line(&mut self, raw: &[u8], frames: &mut Vec<SseFrame>) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);

        if line.is_empty() {
            if let Some(data) = self.data.take() {
                frames.push(SseFrame::Data(data));
            }
            return;
        }

        // Comment
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (&*line, ""),
        };

        // event:, id: and retry: carry nothing this client uses
        if field != "data" {
            return;
        }

        if value.trim() == DONE_SENTINEL {
            if let Some(data) = self.data.take() {
                frames.push(SseFrame::Data(data));
            }
            frames.push(SseFrame::Done);
            return;
        }

        let data = match self.data.take() {
            None => value.to_string(),
            Some(mut data) => {
                data.push('\n');
                data.push_str(value);
                if !is_complete_json(&data) && value.starts_with('{') && is_complete_json(value) {
                    // The buffered lines never completed; the new line starts a frame of its own
                    data.truncate(data.len() - value.len() - 1);
                    frames.push(SseFrame::Data(data));
                    value.to_string()
                } else {
                    data
                }
            }
        };

        if is_complete_json(&data) {
            frames.push(SseFrame::Data(data));
        } else {
            self.data = Some(data);
        }
    }
}

fn is_complete_json(data: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(data).is_ok()
}

/// Observable state of an [`EventStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Between frames
    AwaitingFrame,

    /// Part of a frame has been received
    FrameBuffering,

    /// Finished cleanly, by sentinel or connection close
    Done,

    /// Ended by a transport error, or no frame could be decoded
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Done | StreamState::Failed)
    }
}

pin_project! {
    /// Lazy sequence of [`StreamEvent`]s parsed from an SSE byte stream.
    ///
    /// Events are yielded in arrival order. A frame that fails to decode
    /// is logged and skipped. The sequence cannot be restarted. The
    /// underlying transport is dropped as soon as a terminal state is
    /// reached, or when the `EventStream` itself is dropped.
    pub struct EventStream<S> {
        #[pin]
        inner: Option<S>,
        decoder: SseDecoder,
        pending: VecDeque<SseFrame>,
        terminal: Option<StreamState>,
        emitted: usize,
        skipped: usize,
    }
}

impl<S> EventStream<S> {
    /// Wrap a byte stream
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(inner),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            terminal: None,
            emitted: 0,
            skipped: 0,
        }
    }

    /// Current parser state
    pub fn state(&self) -> StreamState {
        if let Some(state) = self.terminal {
            return state;
        }
        if !self.pending.is_empty() || self.decoder.is_buffering() {
            StreamState::FrameBuffering
        } else {
            StreamState::AwaitingFrame
        }
    }

    /// Number of events yielded so far
    pub fn events_emitted(&self) -> usize {
        self.emitted
    }

    /// Number of malformed frames skipped so far
    pub fn frames_skipped(&self) -> usize {
        self.skipped
    }
}

impl<S> std::fmt::Debug for EventStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("state", &self.state())
            .field("emitted", &self.emitted)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

/// Terminal state for a stream that ended without a transport error.
///
/// If frames arrived but every one of them was malformed, the stream fails
/// with a single error item instead of ending silently.
fn closing_state(emitted: usize, skipped: usize) -> (StreamState, Option<Result<StreamEvent>>) {
    if emitted == 0 && skipped > 0 {
        (
            StreamState::Failed,
            Some(Err(ApertusError::Stream(format!(
                "none of the {} received frames could be decoded",
                skipped
            )))),
        )
    } else {
        (StreamState::Done, None)
    }
}

impl<S> Stream for EventStream<S>
where
    S: Stream<Item = Result<Bytes>>,
{
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if this.terminal.is_some() {
                return Poll::Ready(None);
            }

            while let Some(frame) = this.pending.pop_front() {
                match frame {
                    SseFrame::Done => {
                        let (state, item) = closing_state(*this.emitted, *this.skipped);
                        debug!(emitted = *this.emitted, skipped = *this.skipped, "stream reached [DONE]");
                        *this.terminal = Some(state);
                        this.pending.clear();
                        this.inner.set(None);
                        return Poll::Ready(item);
                    }
                    SseFrame::Data(payload) => {
                        match serde_json::from_str::<ChatCompletionChunk>(&payload) {
                            Ok(chunk) => {
                                *this.emitted += 1;
                                return Poll::Ready(Some(Ok(StreamEvent::from_chunk(chunk))));
                            }
                            Err(e) => {
                                *this.skipped += 1;
                                let preview: String = payload.chars().take(200).collect();
                                warn!(error = %e, payload = %preview, "skipping malformed stream frame");
                            }
                        }
                    }
                }
            }

            let inner = match this.inner.as_mut().as_pin_mut() {
                Some(inner) => inner,
                None => {
                    let (state, item) = closing_state(*this.emitted, *this.skipped);
                    debug!(emitted = *this.emitted, skipped = *this.skipped, "stream closed by server");
                    *this.terminal = Some(state);
                    return Poll::Ready(item);
                }
            };

            match futures::ready!(inner.poll_next(cx)) {
                Some(Ok(bytes)) => {
                    let frames = this.decoder.feed(&bytes);
                    this.pending.extend(frames);
                }
                Some(Err(err)) => {
                    debug!(error = %err, "stream transport failed");
                    *this.terminal = Some(StreamState::Failed);
                    this.pending.clear();
                    this.inner.set(None);
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    // Closed: flush the partial frame, then finish on the next pass
                    this.inner.set(None);
                    let frames = this.decoder.finish();
                    this.pending.extend(frames);
                }
            }
        }
    }
}

impl<S> FusedStream for EventStream<S>
where
    S: Stream<Item = Result<Bytes>>,
{
    fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Folds stream events back into a complete assistant message
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    /// Accumulated content
    pub content: String,

    /// Role from the first chunk that carried one
    pub role: Option<Role>,

    /// Finish reason from the last chunk that carried one
    pub finish_reason: Option<FinishReason>,

    /// Response ID
    pub id: Option<String>,

    /// Model name
    pub model: Option<String>,

    /// Usage from the final chunk
    pub usage: Option<Usage>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one event
    pub fn push(&mut self, event: &StreamEvent) {
        if let Some(chunk) = &event.raw {
            if self.id.is_none() {
                self.id = chunk.id.clone();
                self.model = chunk.model.clone();
            }
            if self.role.is_none() {
                self.role = chunk.choices.first().and_then(|c| c.delta.role.clone());
            }
        }

        if let Some(delta) = &event.delta {
            self.content.push_str(delta);
        }
        if let Some(reason) = &event.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
        if event.usage.is_some() {
            self.usage = event.usage;
        }
    }

    /// Convert to the final message
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::new(self.role.unwrap_or(Role::Assistant), self.content)
    }
}
