//! Blocking Client
//!
//! Synchronous facade over [`AsyncApertus`], driven on a private
//! current-thread runtime. Must not be used from inside an async context.

use crate::api::{ChatCompletion, ChatCompletionRequest, ModelList, StreamEvent, StreamState};
use crate::client::apertus::{AsyncApertus, ChatStream};
use crate::config::ClientConfig;
use crate::error::{ApertusError, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Blocking Apertus client
#[derive(Debug, Clone)]
pub struct Apertus {
    inner: AsyncApertus,
    runtime: Arc<Runtime>,
}

impl Apertus {
    /// Create a client from `APERTUS_API_KEY` / `APERTUS_BASE_URL`
    pub fn new() -> Result<Self> {
        Self::wrap(AsyncApertus::new()?)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::wrap(AsyncApertus::with_api_key(api_key)?)
    }

    /// Create a client from a resolved config
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Self::wrap(AsyncApertus::from_config(config)?)
    }

    fn wrap(inner: AsyncApertus) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApertusError::Config(format!("Failed to create runtime: {}", e)))?;

        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    /// Model listing
    pub fn models(&self) -> Models<'_> {
        Models { client: self }
    }

    /// Chat endpoints
    pub fn chat(&self) -> Chat<'_> {
        Chat { client: self }
    }
}

/// Blocking handle for `/v1/models`
#[derive(Debug, Clone, Copy)]
pub struct Models<'a> {
    client: &'a Apertus,
}

impl Models<'_> {
    /// List the models available to the API key
    pub fn list(&self) -> Result<ModelList> {
        let inner = &self.client.inner;
        self.client.runtime.block_on(inner.models().list())
    }
}

/// Blocking handle for the chat endpoints
#[derive(Debug, Clone, Copy)]
pub struct Chat<'a> {
    client: &'a Apertus,
}

impl<'a> Chat<'a> {
    pub fn completions(&self) -> Completions<'a> {
        Completions {
            client: self.client,
        }
    }
}

/// Blocking handle for `/v1/chat/completions`
#[derive(Debug, Clone, Copy)]
pub struct Completions<'a> {
    client: &'a Apertus,
}

impl Completions<'_> {
    /// Request a complete response
    pub fn create(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        let inner = &self.client.inner;
        self.client
            .runtime
            .block_on(inner.chat().completions().create(request))
    }

    /// Request a streamed response as an iterator of events
    pub fn stream(&self, request: ChatCompletionRequest) -> Result<BlockingChatStream> {
        let inner = &self.client.inner;
        let stream = self
            .client
            .runtime
            .block_on(inner.chat().completions().stream(request))?;

        Ok(BlockingChatStream {
            runtime: self.client.runtime.clone(),
            inner: stream,
        })
    }
}

/// Iterator over a streamed chat completion.
///
/// Each call to `next` blocks until the next frame arrives. Dropping the
/// iterator releases the connection.
pub struct BlockingChatStream {
    runtime: Arc<Runtime>,
    inner: ChatStream,
}

impl BlockingChatStream {
    /// Current parser state
    pub fn state(&self) -> StreamState {
        self.inner.state()
    }
}

impl Iterator for BlockingChatStream {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let inner = &mut self.inner;
        self.runtime.block_on(inner.next())
    }
}

impl std::fmt::Debug for BlockingChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingChatStream")
            .field("state", &self.inner.state())
            .finish()
    }
}
