//! Bounded-concurrency execution of independent requests.

use std::panic;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::chat::ChatService;
use crate::error::ClientError;
use crate::model::{ChatRequest, ChatResponse};

/// Concurrency used when none, or zero, is given.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// A single-request operation the batch runner can fan out.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    async fn handle(&self, request: Self::Request) -> Result<Self::Response, ClientError>;
}

#[async_trait]
impl BatchHandler for ChatService {
    type Request = ChatRequest;
    type Response = ChatResponse;

    async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, ClientError> {
        self.create(request).await
    }
}

/// Runs requests through a [`BatchHandler`] with at most `concurrency` in
/// flight. Results come back in input order.
#[derive(Debug)]
pub struct BatchRunner<H> {
    handler: Arc<H>,
    concurrency: usize,
}

impl<H: BatchHandler> BatchRunner<H> {
    pub fn new(handler: H, concurrency: usize) -> Self {
        Self::from_arc(Arc::new(handler), concurrency)
    }

    pub fn from_arc(handler: Arc<H>, concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            concurrency
        };
        Self {
            handler,
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every request and return one result per request, positionally
    /// aligned with `requests`. A failed request does not affect the others.
    pub async fn run(
        &self,
        requests: Vec<H::Request>,
    ) -> Vec<Result<H::Response, ClientError>> {
        if requests.is_empty() {
            return Vec::new();
        }
        let mut slots: Vec<Option<Result<H::Response, ClientError>>> =
            std::iter::repeat_with(|| None).take(requests.len()).collect();
        debug!(
            "running batch of {} requests, concurrency {}",
            requests.len(),
            self.concurrency
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let handler = self.handler.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => handler.handle(request).await,
                    Err(_) => Err(ClientError::Cancelled),
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                Err(e) => debug!("batch task aborted: {e}"),
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(ClientError::Cancelled)))
            .collect()
    }
}
