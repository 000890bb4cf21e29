//! Streaming chat completions: SSE decoder and pull-based reader.
//!
//! A stream has exactly one producer ([`StreamWriter`], fed line by line from
//! the transport) and one consumer ([`StreamReader`]). They hand chunks off
//! through a bounded FIFO queue of [`STREAM_BUFFER_CAPACITY`] chunks: a fast
//! producer waits for a slow consumer rather than dropping chunks.
//!
//! The stream terminates on the `[DONE]` sentinel, on a malformed or
//! provider-error chunk, on a transport failure, or on cancellation. Terminal
//! states are absorbing: an error is returned by every later read, and a
//! completed stream keeps reporting [`StreamEvent::Done`] with the last usage
//! summary seen.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{ApiError, ClientError};
use crate::model::{StreamChunk, Usage};
use crate::sse::{classify_line, SseLine};

/// Chunks buffered between producer and consumer.
pub const STREAM_BUFFER_CAPACITY: usize = 256;

/// Code attached to malformed chunk payloads.
const MALFORMED_CHUNK_CODE: i64 = 500;

/// Item returned by [`StreamReader::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk with at least one choice.
    Chunk(StreamChunk),
    /// End of stream, with the last usage summary the stream reported.
    Done(Option<Usage>),
}

#[derive(Debug, Default)]
struct State {
    error: Option<ClientError>,
    closed: bool,
    usage: Option<Usage>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    /// Fired on close, error or consumer cancellation; releases a producer
    /// blocked on a full queue.
    done: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a connected producer/consumer pair.
///
/// `cancel` aborts a consumer waiting on an empty queue and a producer
/// waiting on a full one.
pub fn channel(cancel: CancellationToken) -> (StreamWriter, StreamReader) {
    channel_with_capacity(STREAM_BUFFER_CAPACITY, cancel)
}

fn channel_with_capacity(capacity: usize, cancel: CancellationToken) -> (StreamWriter, StreamReader) {
    let (tx, rx) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        done: CancellationToken::new(),
    });
    let writer = StreamWriter {
        tx: Mutex::new(Some(tx)),
        shared: shared.clone(),
        cancel: cancel.clone(),
    };
    let reader = StreamReader { rx, shared, cancel };
    (writer, reader)
}

/// Producer half: decodes raw SSE lines and enqueues chunks.
#[derive(Debug)]
pub struct StreamWriter {
    tx: Mutex<Option<mpsc::Sender<StreamChunk>>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl StreamWriter {
    /// Feed one raw line. Returns `Break` once the stream has terminated and
    /// no further lines should be read.
    pub async fn process_line(&self, line: &str) -> ControlFlow<()> {
        if self.shared.done.is_cancelled() {
            return ControlFlow::Break(());
        }

        let payload = match classify_line(line) {
            SseLine::Skip => return ControlFlow::Continue(()),
            SseLine::Done => {
                debug!("stream completed");
                self.close();
                return ControlFlow::Break(());
            }
            SseLine::Data(payload) => payload,
        };

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("malformed stream chunk: {e}");
                self.set_error(ClientError::Stream(ApiError::new(
                    MALFORMED_CHUNK_CODE,
                    format!("malformed stream chunk: {e}"),
                )));
                return ControlFlow::Break(());
            }
        };

        if let Some(error) = chunk.error {
            warn!("provider error mid-stream: {} ({})", error.message, error.code);
            self.set_error(ClientError::Stream(ApiError::new(error.code, error.message)));
            return ControlFlow::Break(());
        }

        if let Some(usage) = chunk.usage {
            self.shared.lock().usage = Some(usage);
        }

        if chunk.choices.is_empty() {
            return ControlFlow::Continue(());
        }
        self.enqueue(chunk).await
    }

    async fn enqueue(&self, chunk: StreamChunk) -> ControlFlow<()> {
        let tx = match self.sender() {
            Some(tx) => tx,
            None => return ControlFlow::Break(()),
        };
        trace!("enqueue chunk {}", chunk.id);
        tokio::select! {
            sent = tx.send(chunk) => {
                if sent.is_err() {
                    // Consumer dropped its half.
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            _ = self.shared.done.cancelled() => ControlFlow::Break(()),
            _ = self.cancel.cancelled() => {
                self.set_error(ClientError::Cancelled);
                ControlFlow::Break(())
            }
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<StreamChunk>> {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Mark the stream complete. Idempotent.
    pub fn close(&self) {
        let first = {
            let mut state = self.shared.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if first {
            self.tx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            self.shared.done.cancel();
        }
    }

    /// Record a terminal error and close. The first error wins.
    pub fn set_error(&self, error: ClientError) {
        {
            let mut state = self.shared.lock();
            if state.error.is_none() {
                state.error = Some(error);
            }
        }
        self.close();
    }

    /// Resolves once the stream is terminal: closed by either half, errored,
    /// or the reader dropped.
    pub async fn closed(&self) {
        self.shared.done.cancelled().await
    }
}

/// Consumer half: pulls chunks in emission order.
#[derive(Debug)]
pub struct StreamReader {
    rx: mpsc::Receiver<StreamChunk>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl StreamReader {
    /// Next chunk, or [`StreamEvent::Done`] once the stream is exhausted.
    ///
    /// A terminal error is returned on this and every later call.
    pub async fn next(&mut self) -> Result<StreamEvent, ClientError> {
        self.check_error()?;

        let received = tokio::select! {
            chunk = self.rx.recv() => chunk,
            _ = self.cancel.cancelled() => {
                self.fail(ClientError::Cancelled);
                return Err(ClientError::Cancelled);
            }
        };

        match received {
            Some(chunk) => Ok(StreamEvent::Chunk(chunk)),
            None => {
                self.check_error()?;
                Ok(StreamEvent::Done(self.usage()))
            }
        }
    }

    /// Drain the stream, concatenating the string content of each chunk's
    /// first choice delta. Returns the text and the final usage summary.
    pub async fn read_all(&mut self) -> Result<(String, Option<Usage>), ClientError> {
        let mut content = String::new();
        loop {
            match self.next().await? {
                StreamEvent::Chunk(chunk) => {
                    if let Some(text) = chunk.delta_text() {
                        content.push_str(text);
                    }
                }
                StreamEvent::Done(usage) => return Ok((content, usage)),
            }
        }
    }

    /// Last usage summary the stream reported, if any.
    pub fn usage(&self) -> Option<Usage> {
        self.shared.lock().usage
    }

    /// Whether the stream reached a terminal state.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Stop the stream from the consumer side. Chunks already buffered can
    /// still be read; the producer is released and stops reading. Idempotent.
    pub fn close(&mut self) {
        self.rx.close();
        self.shared.lock().closed = true;
        self.shared.done.cancel();
    }

    /// Adapt into a [`Stream`] of chunks that ends at end-of-stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamChunk, ClientError>> + Send {
        stream::unfold(Some(self), |reader| async move {
            let Some(mut reader) = reader else {
                return None;
            };
            match reader.next().await {
                Ok(StreamEvent::Chunk(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(StreamEvent::Done(_)) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn check_error(&self) -> Result<(), ClientError> {
        match &self.shared.lock().error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, error: ClientError) {
        {
            let mut state = self.shared.lock();
            if state.error.is_none() {
                state.error = Some(error);
            }
        }
        self.close();
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.shared.done.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn content_line(text: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({
                "id": "gen-1",
                "model": "openai/gpt-4o",
                "choices": [{"index": 0, "delta": {"role": "assistant", "content": text}}]
            })
        )
    }

    fn pair() -> (StreamWriter, StreamReader) {
        channel(CancellationToken::new())
    }

    #[tokio::test]
    async fn one_chunk_then_done() {
        let (writer, mut reader) = pair();
        assert!(writer.process_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#).await.is_continue());
        assert!(writer.process_line("data: [DONE]").await.is_break());

        match reader.next().await.unwrap() {
            StreamEvent::Chunk(chunk) => assert_eq!(chunk.delta_text(), Some("hi")),
            other => panic!("expected chunk, got {other:?}"),
        }
        assert_eq!(reader.next().await.unwrap(), StreamEvent::Done(None));
        assert_eq!(reader.next().await.unwrap(), StreamEvent::Done(None));
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn skips_comments_blank_and_foreign_lines() {
        let (writer, mut reader) = pair();
        for line in ["", "   ", ": OPENROUTER PROCESSING", "event: ping", "id: 7"] {
            assert!(writer.process_line(line).await.is_continue());
        }
        writer.process_line(&content_line("x")).await;
        writer.process_line("data: [DONE]").await;

        assert!(matches!(reader.next().await.unwrap(), StreamEvent::Chunk(_)));
        assert_eq!(reader.next().await.unwrap(), StreamEvent::Done(None));
    }

    #[tokio::test]
    async fn provider_error_is_sticky() {
        let (writer, mut reader) = pair();
        writer.process_line(&content_line("partial")).await;
        let flow = writer
            .process_line(r#"data: {"error":{"code":502,"message":"down"}}"#)
            .await;
        assert!(flow.is_break());

        for _ in 0..3 {
            let err = reader.next().await.unwrap_err();
            assert!(matches!(&err, ClientError::Stream(e) if e.code == 502 && e.message == "down"));
        }
    }

    #[tokio::test]
    async fn malformed_chunk_terminates_with_error() {
        let (writer, mut reader) = pair();
        assert!(writer.process_line("data: {not json").await.is_break());
        let err = reader.next().await.unwrap_err();
        assert_eq!(err.code(), Some(500));
        assert!(err.to_string().contains("malformed stream chunk"));
        // Lines after termination are ignored.
        assert!(writer.process_line(&content_line("late")).await.is_break());
        assert!(reader.next().await.is_err());
    }

    #[tokio::test]
    async fn first_error_wins_and_close_is_idempotent() {
        let (writer, mut reader) = pair();
        writer.set_error(ClientError::Stream(ApiError::new(503, "first")));
        writer.set_error(ClientError::Stream(ApiError::new(500, "second")));
        writer.close();
        writer.close();
        reader.close();
        reader.close();
        assert_eq!(reader.next().await.unwrap_err().code(), Some(503));
    }

    #[tokio::test]
    async fn read_all_concatenates_text_and_keeps_usage() {
        let (writer, mut reader) = pair();
        writer.process_line(&content_line("Hello")).await;
        writer.process_line(&content_line(" world")).await;
        writer
            .process_line(
                r#"data: {"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
            )
            .await;
        writer.process_line("data: [DONE]").await;

        let (text, usage) = reader.read_all().await.unwrap();
        assert_eq!(text, "Hello world");
        let usage = usage.unwrap();
        assert_eq!(
            (usage.prompt_tokens, usage.completion_tokens, usage.total_tokens),
            (5, 2, 7)
        );
    }

    #[tokio::test]
    async fn usage_on_chunk_with_choices_is_recorded() {
        let (writer, mut reader) = pair();
        writer
            .process_line(
                r#"data: {"choices":[{"delta":{"content":"a"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#,
            )
            .await;
        writer.close();

        assert!(matches!(reader.next().await.unwrap(), StreamEvent::Chunk(_)));
        match reader.next().await.unwrap() {
            StreamEvent::Done(Some(usage)) => assert_eq!(usage.total_tokens, 2),
            other => panic!("expected done with usage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_all_ignores_structured_content() {
        let (writer, mut reader) = pair();
        writer
            .process_line(r#"data: {"choices":[{"delta":{"content":[{"type":"text","text":"skip"}]}}]}"#)
            .await;
        writer.process_line(&content_line("keep")).await;
        writer.close();
        let (text, usage) = reader.read_all().await.unwrap();
        assert_eq!(text, "keep");
        assert!(usage.is_none());
    }

    #[tokio::test]
    async fn full_queue_backpressures_producer() {
        let (writer, mut reader) = pair();
        let line = content_line("x");
        for _ in 0..STREAM_BUFFER_CAPACITY {
            assert!(writer.process_line(&line).await.is_continue());
        }

        let writer = Arc::new(writer);
        let producer = {
            let writer = writer.clone();
            let line = line.clone();
            tokio::spawn(async move { writer.process_line(&line).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "chunk 257 must wait for the consumer");

        assert!(matches!(reader.next().await.unwrap(), StreamEvent::Chunk(_)));
        let flow = tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .unwrap()
            .unwrap();
        assert!(flow.is_continue());

        writer.close();
        let mut received = 1;
        while let StreamEvent::Chunk(_) = reader.next().await.unwrap() {
            received += 1;
        }
        assert_eq!(received, STREAM_BUFFER_CAPACITY + 1);
    }

    #[tokio::test]
    async fn consumer_close_releases_blocked_producer() {
        let (writer, mut reader) = channel_with_capacity(1, CancellationToken::new());
        let line = content_line("x");
        writer.process_line(&line).await;

        let writer = Arc::new(writer);
        let producer = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.process_line(&line).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        reader.close();

        let flow = tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .unwrap()
            .unwrap();
        assert!(flow.is_break());
        // The buffered chunk is still readable.
        assert!(matches!(reader.next().await.unwrap(), StreamEvent::Chunk(_)));
    }

    #[tokio::test]
    async fn writer_observes_consumer_close_and_drop() {
        let (writer, mut reader) = pair();
        reader.close();
        tokio::time::timeout(Duration::from_secs(1), writer.closed())
            .await
            .unwrap();

        let (writer, reader) = pair();
        drop(reader);
        tokio::time::timeout(Duration::from_secs(1), writer.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_unblocks_consumer() {
        let cancel = CancellationToken::new();
        let (_writer, mut reader) = channel(cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), reader.next())
            .await
            .unwrap();
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert!(matches!(reader.next().await, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn into_stream_yields_chunks_in_order() {
        use futures::StreamExt;

        let (writer, reader) = pair();
        for text in ["a", "b", "c"] {
            writer.process_line(&content_line(text)).await;
        }
        writer.process_line("data: [DONE]").await;

        let texts: Vec<String> = reader
            .into_stream()
            .map(|chunk| chunk.unwrap().delta_text().unwrap_or_default().to_string())
            .collect()
            .await;
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
