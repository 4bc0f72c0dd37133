//! Async Client
//!
//! The asynchronous facade: `models().list()`, `chat().completions().create()`
//! and `chat().completions().stream()`.

use crate::api::{ChatCompletion, ChatCompletionRequest, EventStream, ModelList};
use crate::client::http::{ByteStream, HttpClient};
use crate::config::{ClientConfig, ConfigLoader};
use crate::error::Result;

/// Path of the model listing endpoint
pub const MODELS_PATH: &str = "/v1/models";

/// Path of the chat completion endpoint
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Streamed chat completion, yielding one event per frame
pub type ChatStream = EventStream<ByteStream>;

/// Asynchronous Apertus client
#[derive(Debug, Clone)]
pub struct AsyncApertus {
    http: HttpClient,
}

impl AsyncApertus {
    /// Create a client from `APERTUS_API_KEY` / `APERTUS_BASE_URL`
    pub fn new() -> Result<Self> {
        Self::from_config(ConfigLoader::new().resolve()?)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(ConfigLoader::new().api_key(api_key).resolve()?)
    }

    /// Create a client from a resolved config
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&config)?,
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Model listing
    pub fn models(&self) -> Models<'_> {
        Models { http: &self.http }
    }

    /// Chat endpoints
    pub fn chat(&self) -> Chat<'_> {
        Chat { http: &self.http }
    }
}

/// Handle for `/v1/models`
#[derive(Debug, Clone, Copy)]
pub struct Models<'a> {
    http: &'a HttpClient,
}

impl Models<'_> {
    /// List the models available to the API key
    pub async fn list(&self) -> Result<ModelList> {
        self.http.get_json(MODELS_PATH).await
    }
}

/// Handle for the chat endpoints
#[derive(Debug, Clone, Copy)]
pub struct Chat<'a> {
    http: &'a HttpClient,
}

impl<'a> Chat<'a> {
    pub fn completions(&self) -> Completions<'a> {
        Completions { http: self.http }
    }
}

/// Handle for `/v1/chat/completions`
#[derive(Debug, Clone, Copy)]
pub struct Completions<'a> {
    http: &'a HttpClient,
}

impl Completions<'_> {
    /// Request a complete response
    pub async fn create(&self, mut request: ChatCompletionRequest) -> Result<ChatCompletion> {
        request.validate()?;
        request.stream = None;

        self.http.post_json(CHAT_COMPLETIONS_PATH, &request).await
    }

    /// Request a streamed response.
    ///
    /// Fails before returning if the service rejects the request; errors
    /// after that arrive as stream items.
    pub async fn stream(&self, mut request: ChatCompletionRequest) -> Result<ChatStream> {
        request.validate()?;
        request.stream = Some(true);

        let bytes = self.http.post_stream(CHAT_COMPLETIONS_PATH, &request).await?;
        Ok(EventStream::new(bytes))
    }
}
