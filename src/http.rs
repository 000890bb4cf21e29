//! HTTP request execution: auth, static headers, error classification and
//! retries.
//!
//! Non-streaming calls ([`HttpExecutor::post`], [`HttpExecutor::get`]) run
//! under the backoff retrier. Streaming calls ([`HttpExecutor::post_stream`])
//! get exactly one attempt, since a partially delivered stream cannot be
//! replayed.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;

use bytes::Bytes;
use futures::StreamExt;
use itertools::Itertools;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, trace};

use crate::error::{ApiError, ClientError};
use crate::options::{ClientOptions, SecretString};
use crate::retry::{retry, BackoffConfig};
use crate::sse::SSEResponseExt;

/// Build a configured HTTP client from client options.
///
/// A zero timeout leaves the transport without one.
pub fn build_http_client(options: &ClientOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if !options.timeout.is_zero() {
        builder = builder.timeout(options.timeout);
    }

    Ok(builder.build()?)
}

/// Validate static headers once, at construction.
pub fn build_extra_headers(headers: &HashMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ClientError::Config(format!("invalid header name: {key}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ClientError::Config(format!("invalid value for header {key}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Issues authenticated requests against the API base URL.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http: Client,
    base_url: String,
    api_key: SecretString,
    headers: HeaderMap,
    max_retries: u32,
    backoff: BackoffConfig,
    debug: bool,
    logger: Option<tracing::Dispatch>,
    cancel: CancellationToken,
}

impl HttpExecutor {
    /// Build an executor from options, validating them.
    pub fn new(options: &ClientOptions) -> Result<Self, ClientError> {
        let api_key = options.resolve_api_key()?;
        let base_url = options.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL {base_url}: {e}")))?;
        HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|_| ClientError::Config("API key is not a valid header value".to_string()))?;

        let logger = match (&options.logger, options.debug) {
            (Some(logger), _) => Some(logger.clone()),
            (None, true) => Some(development_logger()),
            (None, false) => None,
        };

        Ok(Self {
            http: build_http_client(options)?,
            base_url,
            api_key,
            headers: build_extra_headers(&options.headers)?,
            max_retries: options.max_retries,
            backoff: options.backoff,
            debug: options.debug,
            logger,
            cancel: CancellationToken::new(),
        })
    }

    /// Same executor, observing `cancel` for every call.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body and decode the JSON response, retrying transient
    /// failures. An empty success body decodes as `T::default()`.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        // Serialization failures happen before the network and are never retried.
        let body = Bytes::from(serde_json::to_vec(body)?);
        let bytes = self
            .logged(self.execute_with_retry(Method::POST, path, Some(body)))
            .await?;
        decode(&bytes)
    }

    /// GET and decode the JSON response, retrying transient failures.
    pub async fn get<T>(&self, path: &str) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
    {
        let bytes = self
            .logged(self.execute_with_retry(Method::GET, path, None))
            .await?;
        decode(&bytes)
    }

    /// POST a JSON body once and hand every raw response line to `on_line`,
    /// in arrival order, until the body ends, the transport fails, or the
    /// handler breaks.
    pub async fn post_stream<B, F, Fut>(
        &self,
        path: &str,
        body: &B,
        on_line: F,
    ) -> Result<(), ClientError>
    where
        B: Serialize + ?Sized,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ControlFlow<()>>,
    {
        let body = Bytes::from(serde_json::to_vec(body)?);
        self.logged(self.stream_lines(path, body, on_line)).await
    }

    async fn stream_lines<F, Fut>(
        &self,
        path: &str,
        body: Bytes,
        mut on_line: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ControlFlow<()>>,
    {
        let response = self.send(Method::POST, path, Some(body)).await?;
        let lines = response.sse_lines();
        futures::pin_mut!(lines);

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                line = lines.next() => line,
            };
            match line {
                Some(Ok(line)) => {
                    if self.debug {
                        trace!("stream line: {line}");
                    }
                    if on_line(line).await.is_break() {
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            }
        }
    }

    async fn execute_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<Bytes, ClientError> {
        retry(&self.cancel, self.max_retries, &self.backoff, || {
            let method = method.clone();
            let body = body.clone();
            async move {
                let response = self.send(method, path, body).await?;
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
                    bytes = response.bytes() => {
                        let bytes = bytes?;
                        if self.debug {
                            debug!("response body: {}", String::from_utf8_lossy(&bytes));
                        }
                        Ok(bytes)
                    }
                }
            }
        })
        .await
    }

    /// One attempt: send the request and turn a status >= 400 into an
    /// [`ApiError`].
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{method} {url}");
        if self.debug {
            if let Some(body) = &body {
                debug!("request body: {}", String::from_utf8_lossy(body));
            }
        }

        let mut request = self.request(method, &url);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        debug!("{url} -> {status}");
        if status.as_u16() >= 400 {
            let text = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                text = response.text() => text.unwrap_or_default(),
            };
            return Err(ClientError::Api(ApiError::classify(status.as_u16(), &text)));
        }
        Ok(response)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose_secret()))
            .headers(self.headers.clone())
    }

    /// Run `future` under the configured logger, if any.
    async fn logged<F: Future>(&self, future: F) -> F::Output {
        match &self.logger {
            Some(dispatch) => future.with_subscriber(dispatch.clone()).await,
            None => future.await,
        }
    }

    /// Render a `curl` command for a POST to `path`, with the API key redacted.
    pub fn debug_curl<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> String {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_string_pretty(body).unwrap_or_default();

        let headers = std::iter::once(format!(
            "-H 'Authorization: Bearer {}'",
            self.api_key.redacted()
        ))
        .chain(
            self.headers
                .iter()
                .sorted_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()))
                .map(|(k, v)| {
                    format!(
                        "-H '{}: {}'",
                        escape_for_curl(k.as_str()),
                        escape_for_curl(&String::from_utf8_lossy(v.as_bytes()))
                    )
                }),
        )
        .join(" ");

        format!(
            "curl -X POST '{url}' {headers} -H 'Content-Type: application/json' -d '{}'",
            escape_for_curl(&body)
        )
    }
}

fn decode<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, ClientError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Escape single quotes for use inside a single-quoted shell argument.
fn escape_for_curl(s: &str) -> String {
    s.replace('\'', r"'\''")
}

fn development_logger() -> tracing::Dispatch {
    tracing::Dispatch::new(
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .finish(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn options() -> ClientOptions {
        ClientOptions::new().with_api_key("sk-or-v1-secret")
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&options().with_timeout(Duration::from_secs(30)));
        assert!(client.is_ok());
        let client = build_http_client(&options().with_timeout(Duration::ZERO));
        assert!(client.is_ok());
    }

    #[test]
    fn rejects_invalid_headers() {
        let err = HttpExecutor::new(&options().with_header("bad header", "x")).unwrap_err();
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("bad header")));
        let err = HttpExecutor::new(&options().with_header("X-Ok", "line\nbreak")).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = HttpExecutor::new(&options().with_base_url("not a url")).unwrap_err();
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("base URL")));
    }

    #[test]
    fn trims_trailing_slash() {
        let executor = HttpExecutor::new(&options().with_base_url("http://localhost:9/api/")).unwrap();
        assert_eq!(executor.base_url(), "http://localhost:9/api");
    }

    #[test]
    fn empty_body_decodes_as_default() {
        let value: Vec<u32> = decode(b"").unwrap();
        assert!(value.is_empty());
        let value: Vec<u32> = decode(b" \n").unwrap();
        assert!(value.is_empty());
        let value: Vec<u32> = decode(b"[1,2]").unwrap();
        assert_eq!(value, vec![1, 2]);
        assert!(matches!(decode::<Vec<u32>>(b"{"), Err(ClientError::Json(_))));
    }

    #[test]
    fn debug_curl_redacts_key_and_escapes() {
        let executor = HttpExecutor::new(&options().with_title("Bob's app")).unwrap();
        let curl = executor.debug_curl("/chat/completions", &json!({"content": "it's"}));
        assert!(curl.starts_with("curl -X POST 'https://openrouter.ai/api/v1/chat/completions'"));
        assert!(curl.contains("-H 'Authorization: Bearer sk-or-v...'"));
        assert!(!curl.contains("secret"));
        assert!(curl.contains(r"-H 'x-title: Bob'\''s app'"));
        assert!(curl.contains(r"it'\''s"));
    }
}
