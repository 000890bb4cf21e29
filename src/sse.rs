//! Server-Sent Events (SSE) line framing and classification.
//!
//! SSE format:
//! ```text
//! : OPENROUTER PROCESSING
//!
//! data: {"key": "value"}
//!
//! data: [DONE]
//! ```

use bytes::BytesMut;
use futures::stream::{self, Stream, StreamExt};

use crate::error::ClientError;

/// Classification of a single raw SSE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Blank line, comment, or a field other than `data`.
    Skip,
    /// Trimmed payload of a `data: ` line.
    Data(&'a str),
    /// The `[DONE]` completion sentinel.
    Done,
}

/// Classify one raw line received from the transport.
///
/// # Example
/// ```
/// use openrouter::sse::{classify_line, SseLine};
///
/// assert_eq!(classify_line(": keep-alive"), SseLine::Skip);
/// assert_eq!(classify_line("data: {\"a\":1}\n"), SseLine::Data("{\"a\":1}"));
/// assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
/// ```
pub fn classify_line(line: &str) -> SseLine<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    match parse_sse_line(line) {
        Some(data) if is_done_marker(data) => SseLine::Done,
        Some(data) => SseLine::Data(data),
        None => SseLine::Skip,
    }
}

/// Parse an SSE line to extract the data portion.
///
/// SSE lines are in the format: `data: <content>`
///
/// # Example
/// ```
/// use openrouter::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "invalid";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").map(|s| s.trim())
}

/// Check if an SSE data line indicates the stream is done.
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

/// Extension trait for `reqwest::Response` to split the body into raw lines.
pub trait SSEResponseExt {
    /// Convert the response into a stream of raw lines, in arrival order.
    ///
    /// Lines are yielded untrimmed except for the trailing line terminator; a
    /// final line without a terminator is yielded when the body ends.
    fn sse_lines(self) -> impl Stream<Item = Result<String, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse_lines(self) -> impl Stream<Item = Result<String, ClientError>> + Send {
        lines(self.bytes_stream())
    }
}

/// Split a byte stream into lines. Bytes are buffered until a newline so that
/// multi-byte characters spanning two network chunks decode intact.
pub fn lines<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ClientError> + Send,
{
    stream::unfold(
        (Box::pin(byte_stream), BytesMut::new(), false),
        |(mut byte_stream, mut buffer, mut stream_ended)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.split_to(pos + 1);
                    let text = decode_line(&line[..pos]);
                    return Some((Ok(text), (byte_stream, buffer, stream_ended)));
                }

                if stream_ended {
                    if buffer.is_empty() {
                        return None;
                    }
                    let text = decode_line(&buffer);
                    buffer.clear();
                    return Some((Ok(text), (byte_stream, buffer, stream_ended)));
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        // Transport failures are terminal.
                        stream_ended = true;
                        buffer.clear();
                        return Some((Err(e.into()), (byte_stream, buffer, stream_ended)));
                    }
                    None => stream_ended = true,
                }
            }
        },
    )
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
