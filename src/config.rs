//! Client configuration.
//!
//! [`ClientConfig`] bundles everything a transport needs: the API key, the
//! base URL, timeouts, the retry policy and the retry-logging toggle. Build
//! it with [`ClientConfig::builder`]; `build()` validates every field so a
//! transport never sees an inconsistent configuration.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::http::constants::{CONNECT_TIMEOUT, DEFAULT_BASE_URL, REQUEST_TIMEOUT};
use crate::retry::RetryConfig;

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The API key was empty or whitespace.
    #[error("API key must not be empty")]
    MissingApiKey,

    /// The base URL could not be parsed or is not http(s).
    #[error("invalid base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A retry setting broke one of the [`RetryConfig`] invariants.
    #[error("invalid retry configuration: {reason}")]
    InvalidRetry {
        /// Which invariant failed.
        reason: String,
    },

    /// A timeout was zero.
    #[error("{name} must be greater than zero")]
    ZeroTimeout {
        /// Which timeout.
        name: &'static str,
    },
}

/// Validated configuration shared by the async and blocking transports.
#[derive(Clone)]
pub struct ClientConfig {
    api_key: String,
    base_url: Url,
    connect_timeout: Duration,
    request_timeout: Duration,
    retry: RetryConfig,
    log_retries: bool,
}

impl ClientConfig {
    /// Starts a builder with the given API key and default settings.
    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(api_key)
    }

    /// The API key sent as a bearer token.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The base URL request paths are joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Time allowed to establish a connection.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Time allowed for a single attempt, end to end.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Whether each retry is logged at WARN instead of DEBUG.
    #[must_use]
    pub fn log_retries(&self) -> bool {
        self.log_retries
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url.as_str())
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("log_retries", &self.log_retries)
            .finish()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    api_key: String,
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    retry: RetryConfig,
    log_retries: bool,
}

impl ClientConfigBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
            log_retries: false,
        }
    }

    /// Overrides the base URL (default `https://api.docutray.com`).
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the connect timeout (default 5 seconds).
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the per-attempt request timeout (default 60 seconds).
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Keeps the current retry policy but changes the retry budget.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry = self.retry.with_max_retries(max_retries);
        self
    }

    /// Replaces the whole retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Logs each retry at WARN level when enabled.
    #[must_use]
    pub fn log_retries(mut self, enabled: bool) -> Self {
        self.log_retries = enabled;
        self
    }

    /// Validates the settings and produces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the API key is empty, the base URL is not
    /// an absolute http(s) URL, a timeout is zero, or the retry policy breaks
    /// one of its invariants.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let base_url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url,
                reason: format!("unsupported scheme {}", base_url.scheme()),
            });
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "connect timeout",
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "request timeout",
            });
        }

        self.retry.validate()?;

        Ok(ClientConfig {
            api_key: self.api_key,
            base_url,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            retry: self.retry,
            log_retries: self.log_retries,
        })
    }
}

/// Masks an API key for logs: the first five characters, then `***`.
#[must_use]
pub fn mask_api_key(api_key: &str) -> String {
    match api_key.char_indices().nth(5) {
        Some((cut, _)) => format!("{}***", &api_key[..cut]),
        None => "***".to_string(),
    }
}
