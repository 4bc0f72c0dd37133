//! HTTP Client
//!
//! Thin transport over `reqwest`: bearer auth, JSON bodies, and mapping of
//! non-2xx responses to [`ApiError`]. One request per call, no retries.

use crate::config::ClientConfig;
use crate::error::{ApertusError, ApiError, Result};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::pin::Pin;
use tracing::debug;

/// Raw body of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const EVENT_STREAM: &str = "text/event-stream";

/// HTTP client bound to one base URL and credential
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// Inner reqwest client
    client: Client,

    /// API root, without trailing slash
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ApertusError::Config(format!("Invalid API key format: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("apertus-rs/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.read_timeout {
            builder = builder.read_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ApertusError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a path and decode the JSON response
    pub async fn get_json<R>(&self, path: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(method = "GET", url = %url, "sending request");

        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;
        decode_json(response).await
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(method = "POST", url = %url, "sending request");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        decode_json(response).await
    }

    /// POST a JSON body and return the response body as a byte stream.
    ///
    /// Dropping the returned stream releases the connection.
    pub async fn post_stream<T>(&self, path: &str, body: &T) -> Result<ByteStream>
    where
        T: Serialize + ?Sized,
    {
        use async_stream::stream;
        use futures::StreamExt;

        let url = self.url(path);
        debug!(method = "POST", url = %url, "opening event stream");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM)
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut byte_stream = response.bytes_stream();
        let s = stream! {
            while let Some(chunk) = byte_stream.next().await {
                yield chunk.map_err(ApertusError::from);
            }
        };

        Ok(Box::pin(s))
    }
}

/// Pass 2xx responses through; turn anything else into an [`ApiError`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let err = ApiError::from_response(status, url, body);
    debug!(status = err.status_code, message = %err.message, "request failed");

    Err(err.into())
}

async fn decode_json<R>(response: Response) -> Result<R>
where
    R: DeserializeOwned,
{
    let url = response.url().to_string();
    let body = response.text().await?;

    serde_json::from_str(&body).map_err(|e| {
        ApertusError::Transport(format!(
            "Failed to parse response from {}: {}. Body: {}",
            url,
            e,
            body.chars().take(500).collect::<String>()
        ))
    })
}
