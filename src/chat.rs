//! Chat completions, streaming and legacy prompt completions.

use std::sync::Arc;

use tracing::debug;

use crate::error::ClientError;
use crate::http::HttpExecutor;
use crate::model::{ChatRequest, ChatResponse, CompletionsRequest, CompletionsResponse};
use crate::stream::{self, StreamReader};

pub(crate) const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Clone)]
pub struct ChatService {
    executor: HttpExecutor,
}

impl ChatService {
    pub fn new(executor: HttpExecutor) -> Self {
        Self { executor }
    }

    /// Send a chat completion request and wait for the full response.
    pub async fn create(&self, request: ChatRequest) -> Result<ChatResponse, ClientError> {
        let request = ChatRequest {
            stream: false,
            ..request
        };
        self.executor.post(CHAT_COMPLETIONS_PATH, &request).await
    }

    /// Start a streaming chat completion.
    ///
    /// The request is sent from a background task that feeds the returned
    /// reader. HTTP and transport failures are reported by the reader's next
    /// read, not here; this only fails if the request cannot be serialized.
    pub async fn create_stream(&self, request: ChatRequest) -> Result<StreamReader, ClientError> {
        let request = ChatRequest {
            stream: true,
            ..request
        };
        let body = serde_json::to_value(&request)?;

        let executor = self.executor.clone();
        let (writer, reader) = stream::channel(executor.cancellation_token().clone());
        let writer = Arc::new(writer);

        tokio::spawn(async move {
            let feed = writer.clone();
            let transfer = executor.post_stream(CHAT_COMPLETIONS_PATH, &body, move |line| {
                let feed = feed.clone();
                async move { feed.process_line(&line).await }
            });
            // A consumer close drops the response body and its connection,
            // even while the server is stalled between lines.
            let result = tokio::select! {
                result = transfer => result,
                _ = writer.closed() => {
                    debug!("chat stream closed by consumer");
                    Ok(())
                }
            };
            match result {
                Ok(()) => writer.close(),
                Err(e) => {
                    debug!("chat stream failed: {e}");
                    writer.set_error(e);
                }
            }
        });

        Ok(reader)
    }

    /// Legacy prompt-based completion.
    pub async fn create_completions(
        &self,
        request: CompletionsRequest,
    ) -> Result<CompletionsResponse, ClientError> {
        let request = CompletionsRequest {
            stream: false,
            ..request
        };
        self.executor.post(CHAT_COMPLETIONS_PATH, &request).await
    }
}

