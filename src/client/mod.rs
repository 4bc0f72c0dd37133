//! Client Module
//!
//! HTTP transport plus the async and blocking facades.

pub mod apertus;
pub mod blocking;
pub mod http;

pub use apertus::{AsyncApertus, ChatStream, CHAT_COMPLETIONS_PATH, MODELS_PATH};
pub use blocking::{Apertus, BlockingChatStream};
pub use http::{ByteStream, HttpClient};
