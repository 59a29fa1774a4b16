//! Endpoint connection settings
//!
//! Credentials and base URL are read once at startup into an
//! [`EndpointConfig`] and handed to the endpoint constructor by reference.

use std::env;
use std::time::Duration;

/// Default base URL for the hosted completions API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Connection settings for the completion endpoint
#[derive(Clone, PartialEq)]
pub struct EndpointConfig {
    /// Bearer token sent with every request
    pub api_key: String,
    /// Base URL without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

// Keeps the key out of logs.
impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EndpointConfig {
    /// Create config with explicit key and the default base URL
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Read key and optional base URL from the environment
    ///
    /// Returns `None` when the API key variable is unset or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())?;
        let config = Self::new(&api_key);
        Some(match env::var(BASE_URL_ENV) {
            Ok(url) if !url.is_empty() => config.with_base_url(&url),
            _ => config,
        })
    }

    /// Set custom base URL (for proxies or compatible servers)
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
