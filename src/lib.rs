//! Apertus - typed client for the Apertus chat-completion API
//!
//! Provides model listing, one-shot chat completion and streamed chat
//! completion, in both blocking ([`Apertus`]) and async ([`AsyncApertus`])
//! flavours.
//!
//! ```no_run
//! use apertus::{Apertus, ChatCompletionRequest, ChatMessage};
//!
//! # fn main() -> apertus::Result<()> {
//! let client = Apertus::new()?; // reads APERTUS_API_KEY
//!
//! let request = ChatCompletionRequest::new(
//!     "swiss-ai/apertus-70b-instruct",
//!     vec![ChatMessage::user("Hello!")],
//! );
//! for event in client.chat().completions().stream(request)? {
//!     if let Some(delta) = event?.delta {
//!         print!("{}", delta);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;

pub use api::{
    ChatChoice, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage,
    EventStream, FinishReason, Model, ModelList, Role, StreamAccumulator, StreamEvent,
    StreamState, Usage,
};
pub use client::{Apertus, AsyncApertus, BlockingChatStream, ChatStream};
pub use config::{ClientConfig, ConfigLoader};
pub use error::{ApertusError, ApiError, Result};
