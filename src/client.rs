//! Client facade over the API services.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::batch::BatchRunner;
use crate::chat::{ChatService, CHAT_COMPLETIONS_PATH};
use crate::cost::CostService;
use crate::embeddings::EmbeddingsService;
use crate::error::ClientError;
use crate::http::HttpExecutor;
use crate::model::{ChatRequest, ChatResponse};
use crate::models::{ModelCache, ModelService};
use crate::options::ClientOptions;

/// Entry point to the API.
///
/// Cheap to clone. Clones and cancellation views share one connection pool
/// and one model cache.
///
/// # Example
/// ```no_run
/// use openrouter::{ChatRequest, Client, ClientOptions, Message};
///
/// #[tokio::main]
/// async fn main() -> Result<(), openrouter::ClientError> {
///     let client = Client::new(ClientOptions::new().with_api_key("sk-or-..."))?;
///     let request = ChatRequest::new("openai/gpt-4o-mini", vec![Message::user("Hello!")]);
///     let response = client.chat().create(request).await?;
///     println!("{}", response.text().unwrap_or_default());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    executor: HttpExecutor,
    cache: Arc<ModelCache>,
}

impl Client {
    /// Build a client, validating the options.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let executor = HttpExecutor::new(&options)?;
        Ok(Self {
            executor,
            cache: Arc::new(ModelCache::new(options.model_cache_ttl)),
        })
    }

    /// Build a client from `OPENROUTER_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientOptions::from_env()?)
    }

    /// A view of this client whose calls all observe `cancel`.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            executor: self.executor.with_cancellation(cancel),
            cache: self.cache.clone(),
        }
    }

    pub fn chat(&self) -> ChatService {
        ChatService::new(self.executor.clone())
    }

    pub fn embeddings(&self) -> EmbeddingsService {
        EmbeddingsService::new(self.executor.clone())
    }

    pub fn models(&self) -> ModelService {
        ModelService::new(self.executor.clone(), self.cache.clone())
    }

    pub fn cost(&self) -> CostService {
        CostService::new(self.models())
    }

    /// Shorthand for [`CostService::estimate`].
    pub async fn estimate_cost(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<f64, ClientError> {
        self.cost().estimate(model_id, input_tokens, output_tokens).await
    }

    /// Run chat requests with at most `concurrency` in flight (zero means
    /// the default). Results are in input order.
    pub async fn batch_chat(
        &self,
        requests: Vec<ChatRequest>,
        concurrency: usize,
    ) -> Vec<Result<ChatResponse, ClientError>> {
        BatchRunner::new(self.chat(), concurrency).run(requests).await
    }

    /// `curl` command equivalent to sending `request`, API key redacted.
    pub fn debug_curl(&self, request: &ChatRequest) -> String {
        self.executor.debug_curl(CHAT_COMPLETIONS_PATH, request)
    }
}
