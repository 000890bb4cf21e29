//! # openrouter - Client for the OpenRouter LLM aggregation API
//!
//! An async Rust client for chat completions (streaming and non-streaming),
//! embeddings, model discovery and cost estimation.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Retries with exponential backoff and jitter for rate limits, timeouts
//!   and unavailable upstreams
//! - Typed errors: every API failure carries a machine-checkable code
//! - Streaming via Server-Sent Events with a bounded, backpressured reader
//! - Model list cached for a configurable TTL
//! - Bounded-concurrency batch execution, results kept in input order
//!
//! ## Architecture
//!
//! - **[`Client`]**: facade handing out service handles
//! - **[`http::HttpExecutor`]**: auth, static headers, error classification and
//!   retries for every call
//! - **[`stream`]**: SSE decoder and pull-based [`stream::StreamReader`]
//! - **[`models`]**: model discovery behind [`models::ModelCache`]
//! - **[`batch`]**: [`batch::BatchRunner`] over any [`batch::BatchHandler`]
//!
//! ## Example
//! ```no_run
//! use openrouter::{ChatRequest, Client, ClientOptions, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(
//!         ClientOptions::from_env()?.with_title("my-app"),
//!     )?;
//!
//!     let request = ChatRequest::new(
//!         "anthropic/claude-3.5-sonnet",
//!         vec![Message::user("Write a haiku about Rust.")],
//!     );
//!     let mut stream = client.chat().create_stream(request).await?;
//!     let (text, usage) = stream.read_all().await?;
//!     println!("{text}");
//!     if let Some(usage) = usage {
//!         println!("{} tokens", usage.total_tokens);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod chat;
pub mod client;
pub mod cost;
pub mod embeddings;
pub mod error;
pub mod http;
pub mod model;
pub mod models;
pub mod options;
pub mod retry;
pub mod routing;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::Client;
pub use error::{ApiError, ClientError, ErrorKind};
pub use model::{ChatRequest, ChatResponse, Message, Role, StreamChunk, Usage};
pub use options::{ClientOptions, SecretString};
pub use stream::{StreamEvent, StreamReader};
