//! Error types and HTTP error classification.
//!
//! Every failure surfaced by the client is a [`ClientError`]. Failures reported
//! by the API itself carry an [`ApiError`], whose numeric `code` is what callers
//! branch on (rate limiting vs. auth failure, and so on). Use [`ErrorKind`] for
//! a typed view of the same code:
//!
//! ```
//! use openrouter::error::{ApiError, ErrorKind};
//!
//! let err = ApiError::classify(429, r#"{"error":{"code":429,"message":"slow down"}}"#);
//! assert_eq!(err.kind(), ErrorKind::RateLimited);
//! assert!(err.retryable());
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Structured error returned by the API (or decoded mid-stream).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// HTTP status of the response that carried the error. Zero for errors
    /// decoded from a stream after the response headers were accepted.
    pub http_status: u16,
    /// Provider-supplied application code, or the HTTP status when absent.
    pub code: i64,
    pub message: String,
    pub metadata: Option<Map<String, Value>>,
}

impl ApiError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            http_status: 0,
            code,
            message: message.into(),
            metadata: None,
        }
    }

    /// Build an error from a failed response's status and raw body.
    ///
    /// A body matching `{"error": {"code", "message", "metadata"}}` provides the
    /// code (falling back to `status` when zero or absent), message and metadata.
    /// Anything else yields `code == status` with the raw body as the message.
    pub fn classify(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let code = match envelope.error.code {
                    Some(code) if code != 0 => code,
                    _ => i64::from(status),
                };
                Self {
                    http_status: status,
                    code,
                    message: envelope.error.message,
                    metadata: envelope.error.metadata,
                }
            }
            Err(_) => Self {
                http_status: status,
                code: i64::from(status),
                message: body.to_string(),
                metadata: None,
            },
        }
    }

    /// Whether re-attempting the request may succeed (429, 408, 503).
    pub fn retryable(&self) -> bool {
        is_retryable_code(self.code)
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "API error (code: {})", self.code)
        } else {
            write!(f, "{} (code: {})", self.message, self.code)
        }
    }
}

impl std::error::Error for ApiError {}

/// Retryability is a pure function of the code.
pub fn is_retryable_code(code: i64) -> bool {
    matches!(code, 408 | 429 | 503)
}

/// Well-known API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    InsufficientCredits,
    Moderation,
    NotFound,
    Timeout,
    RateLimited,
    Provider,
    ServiceUnavailable,
    Other(i64),
}

impl ErrorKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            402 => ErrorKind::InsufficientCredits,
            403 => ErrorKind::Moderation,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            502 => ErrorKind::Provider,
            503 => ErrorKind::ServiceUnavailable,
            other => ErrorKind::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::InsufficientCredits => 402,
            ErrorKind::Moderation => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 408,
            ErrorKind::RateLimited => 429,
            ErrorKind::Provider => 502,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::Other(code) => code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

/// Errors that can occur during client operations.
///
/// Cloneable so that a terminated stream can hand the same error to every
/// subsequent read.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[source] Arc<reqwest::Error>),

    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    #[error("openrouter: {0}")]
    Api(ApiError),

    #[error("stream error: {0}")]
    Stream(ApiError),

    #[error("request cancelled")]
    Cancelled,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("pricing not available for model: {0}")]
    PricingUnavailable(String),
}

impl ClientError {
    /// Machine-checkable code, where the error has one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ClientError::Api(e) | ClientError::Stream(e) => Some(e.code),
            ClientError::ModelNotFound(_) | ClientError::PricingUnavailable(_) => {
                Some(ErrorKind::NotFound.code())
            }
            ClientError::Http(e) => e.status().map(|s| i64::from(s.as_u16())),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.code().map(ErrorKind::from_code)
    }

    /// The structured API error, for `Api` and `Stream` failures.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(e) | ClientError::Stream(e) => Some(e),
            _ => None,
        }
    }

    /// Retry verdict used by the backoff retrier.
    ///
    /// Stream errors are never retried: there is no safe replay point once
    /// part of a response has been delivered.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api(e) => e.retryable(),
            ClientError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Json(Arc::new(err))
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        ClientError::Api(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_parses_error_envelope() {
        let body = r#"{"error":{"code":402,"message":"Insufficient credits","metadata":{"balance":0}}}"#;
        let err = ApiError::classify(402, body);
        assert_eq!(err.http_status, 402);
        assert_eq!(err.code, 402);
        assert_eq!(err.message, "Insufficient credits");
        assert_eq!(err.kind(), ErrorKind::InsufficientCredits);
        let metadata = err.metadata.unwrap();
        assert_eq!(metadata["balance"], 0);
    }

    #[test]
    fn classify_prefers_embedded_code() {
        let err = ApiError::classify(400, r#"{"error":{"code":502,"message":"upstream down"}}"#);
        assert_eq!(err.http_status, 400);
        assert_eq!(err.code, 502);
    }

    #[test]
    fn classify_falls_back_to_status_on_zero_code() {
        let err = ApiError::classify(503, r#"{"error":{"code":0,"message":"busy"}}"#);
        assert_eq!(err.code, 503);
        let err = ApiError::classify(429, r#"{"error":{"message":"slow down"}}"#);
        assert_eq!(err.code, 429);
        assert_eq!(err.message, "slow down");
    }

    #[test]
    fn classify_falls_back_to_raw_body() {
        let err = ApiError::classify(500, "<html>Internal Server Error</html>");
        assert_eq!(err.code, 500);
        assert_eq!(err.message, "<html>Internal Server Error</html>");
        assert!(err.metadata.is_none());
    }

    #[test]
    fn retryable_codes() {
        for code in [408, 429, 503] {
            assert!(is_retryable_code(code), "{code} should be retryable");
        }
        for code in [400, 401, 402, 403, 404, 409, 422, 500, 502, 504] {
            assert!(!is_retryable_code(code), "{code} should not be retryable");
        }
    }

    #[test]
    fn kinds_round_trip_codes() {
        for code in [400, 401, 402, 403, 404, 408, 429, 502, 503, 418] {
            assert_eq!(ErrorKind::from_code(code).code(), code);
        }
        assert_eq!(ErrorKind::from_code(418), ErrorKind::Other(418));
    }

    #[test]
    fn client_error_codes() {
        let api = ClientError::Api(ApiError::new(401, "bad key"));
        assert_eq!(api.code(), Some(401));
        assert_eq!(api.kind(), Some(ErrorKind::Unauthorized));
        assert!(!api.is_retryable());

        let limited = ClientError::Api(ApiError::new(429, "slow down"));
        assert!(limited.is_retryable());

        let stream = ClientError::Stream(ApiError::new(503, "gone"));
        assert_eq!(stream.code(), Some(503));
        assert!(!stream.is_retryable());

        assert_eq!(ClientError::ModelNotFound("x".into()).code(), Some(404));
        assert!(!ClientError::Cancelled.is_retryable());
        assert!(ClientError::Cancelled.code().is_none());
    }

    #[test]
    fn display_includes_code() {
        let err = ClientError::Api(ApiError::new(429, "rate limited"));
        assert_eq!(err.to_string(), "openrouter: rate limited (code: 429)");
        let err = ApiError::new(500, "");
        assert_eq!(err.to_string(), "API error (code: 500)");
    }
}
