//! Client configuration.
//!
//! Recognized options: API key (falling back to `OPENROUTER_API_KEY`), base
//! URL, timeout, max retry count, custom headers, debug flag and a custom
//! `tracing` dispatcher used as the logger.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ClientError;
use crate::retry::{BackoffConfig, DEFAULT_MAX_RETRIES};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MODEL_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";
pub const TIMEOUT_ENV: &str = "OPENROUTER_TIMEOUT_SECS";
pub const MAX_RETRIES_ENV: &str = "OPENROUTER_MAX_RETRIES";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// First seven characters followed by `...`, for display.
    pub fn redacted(&self) -> String {
        match self.0.get(..7) {
            Some(prefix) if self.0.len() > 7 => format!("{prefix}..."),
            _ => "[REDACTED]".to_string(),
        }
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Options used to construct a [`Client`](crate::client::Client).
///
/// # Example
/// ```rust
/// use openrouter::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new()
///     .with_api_key("sk-or-...")
///     .with_timeout(Duration::from_secs(30))
///     .with_max_retries(5)
///     .with_referer("https://example.com")
///     .with_title("Example App");
/// assert_eq!(options.headers["X-Title"], "Example App");
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API key. When `None`, `OPENROUTER_API_KEY` is consulted at construction.
    pub api_key: Option<SecretString>,

    /// Base URL for API endpoints
    pub base_url: String,

    /// Transport timeout per request. Zero disables it.
    pub timeout: Duration,

    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,

    /// Static headers merged into every request
    pub headers: HashMap<String, String>,

    /// Log request and response bodies at DEBUG level
    pub debug: bool,

    /// Dispatcher every request is logged through
    pub logger: Option<tracing::Dispatch>,

    pub backoff: BackoffConfig,

    pub model_cache_ttl: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            headers: HashMap::new(),
            debug: false,
            logger: None,
            backoff: BackoffConfig::default(),
            model_cache_ttl: DEFAULT_MODEL_CACHE_TTL,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from the process environment.
    ///
    /// Timeout (seconds) and retry count are parsed as signed integers so that
    /// negative values are reported instead of silently wrapping.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut options = Self::default();

        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.is_empty()) {
            options.api_key = Some(key.into());
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.is_empty()) {
            options.base_url = url;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs = parse_non_negative(TIMEOUT_ENV, &raw, "timeout")?;
            options.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(MAX_RETRIES_ENV) {
            let retries = parse_non_negative(MAX_RETRIES_ENV, &raw, "max retries")?;
            options.max_retries = u32::try_from(retries)
                .map_err(|_| ClientError::Config(format!("{MAX_RETRIES_ENV} is too large: {raw}")))?;
        }

        Ok(options)
    }

    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Add a single header, replacing any previous value.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merge headers into the existing set.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// `HTTP-Referer` used for app attribution on openrouter.ai.
    pub fn with_referer(self, url: impl Into<String>) -> Self {
        self.with_header("HTTP-Referer", url)
    }

    /// `X-Title` used as the app title on openrouter.ai.
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_header("X-Title", title)
    }

    pub fn with_forwarded_for(self, ip: impl Into<String>) -> Self {
        self.with_header("X-Forwarded-For", ip)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_logger(mut self, logger: impl Into<tracing::Dispatch>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_model_cache_ttl(mut self, ttl: Duration) -> Self {
        self.model_cache_ttl = ttl;
        self
    }

    /// Resolve the API key from the options or the environment.
    pub(crate) fn resolve_api_key(&self) -> Result<SecretString, ClientError> {
        self.api_key
            .clone()
            .filter(|k| !k.expose_secret().is_empty())
            .or_else(|| {
                std::env::var(API_KEY_ENV)
                    .ok()
                    .filter(|k| !k.is_empty())
                    .map(SecretString::from)
            })
            .ok_or_else(|| {
                ClientError::Config(format!(
                    "missing API key: set {API_KEY_ENV} or use ClientOptions::with_api_key"
                ))
            })
    }
}

fn parse_non_negative(var: &str, raw: &str, what: &str) -> Result<u64, ClientError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("{var} is not an integer: {raw}")))?;
    u64::try_from(value).map_err(|_| ClientError::Config(format!("{what} must be non-negative")))
}
