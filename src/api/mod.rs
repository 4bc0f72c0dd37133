//! API Module
//!
//! Request/response types and streaming support.

pub mod completion;
pub mod models;
pub mod streaming;

pub use completion::{
    ChatChoice, ChatCompletion, ChatCompletionRequest, ChatMessage, FinishReason, Role, Usage,
};
pub use models::{Model, ModelList};
pub use streaming::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, EventStream, SseDecoder, SseFrame,
    StreamAccumulator, StreamEvent, StreamState, DONE_SENTINEL,
};
