//! Client Settings
//!
//! The resolved configuration a client is built from.

use std::fmt;
use std::time::Duration;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.publicai.co";

/// Environment variable holding the default API key
pub const API_KEY_ENV: &str = "APERTUS_API_KEY";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "APERTUS_BASE_URL";

/// Resolved client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token sent with every request
    pub api_key: String,

    /// API root, without trailing slash
    pub base_url: String,

    /// Deadline for the whole request, body included (none by default).
    ///
    /// This also bounds a streamed reply end to end. Use
    /// [`read_timeout`](Self::read_timeout) to limit only the gap between
    /// received chunks.
    pub timeout: Option<Duration>,

    /// Connection establishment deadline (none by default)
    pub connect_timeout: Option<Duration>,

    /// Longest wait for the next chunk of a response (none by default)
    pub read_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Create a config with the given key and the default base URL
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            connect_timeout: None,
            read_timeout: None,
        }
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&base_url.into());
        self
    }

    /// Set the whole-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the idle limit between received chunks
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
