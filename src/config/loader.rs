//! Configuration Loader
//!
//! Resolves a [`ClientConfig`] from explicit arguments, the process
//! environment and an optional dotenv file.

use crate::config::settings::{
    normalize_base_url, ClientConfig, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL,
};
use crate::error::{ApertusError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Configuration loader.
///
/// Precedence, highest first: explicit value, process environment,
/// dotenv file, built-in default. Empty values count as absent.
#[derive(Default, Clone)]
pub struct ConfigLoader {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,

    /// Values read from a dotenv file, consulted after the process environment
    file_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a loader with no explicit values
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this API key instead of `APERTUS_API_KEY`
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Use this base URL instead of `APERTUS_BASE_URL`
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Apply a whole-request deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply a connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Apply an idle limit between received chunks
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Read fallback values from a dotenv file.
    ///
    /// The process environment is left untouched.
    pub fn env_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            ApertusError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        for item in iter {
            let (key, value) = item.map_err(|e| {
                ApertusError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            self.file_vars.insert(key, value);
        }

        Ok(self)
    }

    /// Resolve against the process environment
    pub fn resolve(self) -> Result<ClientConfig> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` in place of the process environment
    pub fn resolve_with<F>(self, lookup: F) -> Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            non_empty(lookup(name)).or_else(|| non_empty(self.file_vars.get(name).cloned()))
        };

        let api_key = non_empty(self.api_key.clone())
            .or_else(|| var(API_KEY_ENV))
            .ok_or_else(|| {
                ApertusError::Config(format!(
                    "API key is required. Set {} or pass an api key explicitly",
                    API_KEY_ENV
                ))
            })?;

        let base_url = non_empty(self.base_url.clone())
            .or_else(|| var(BASE_URL_ENV))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let base_url = normalize_base_url(&base_url);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ApertusError::Config(format!(
                "Invalid base URL '{}': expected an http:// or https:// URL",
                base_url
            )));
        }

        Ok(ClientConfig {
            api_key,
            base_url,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        })
    }
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("file_vars", &self.file_vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
