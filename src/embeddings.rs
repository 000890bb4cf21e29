//! Text embeddings.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::http::HttpExecutor;
use crate::model::Usage;
use crate::routing::ProviderPreferences;

/// Text to embed: one string or a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl Default for EmbeddingInput {
    fn default() -> Self {
        EmbeddingInput::Batch(Vec::new())
    }
}

impl From<&str> for EmbeddingInput {
    fn from(s: &str) -> Self {
        EmbeddingInput::Single(s.to_string())
    }
}

impl From<String> for EmbeddingInput {
    fn from(s: String) -> Self {
        EmbeddingInput::Single(s)
    }
}

impl From<Vec<String>> for EmbeddingInput {
    fn from(v: Vec<String>) -> Self {
        EmbeddingInput::Batch(v)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl EmbeddingsRequest {
    pub fn new(model: impl Into<String>, input: impl Into<EmbeddingInput>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsResponse {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub data: Vec<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    #[serde(default)]
    pub object: String,
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsService {
    executor: HttpExecutor,
}

impl EmbeddingsService {
    pub fn new(executor: HttpExecutor) -> Self {
        Self { executor }
    }

    pub async fn create(&self, request: EmbeddingsRequest) -> Result<EmbeddingsResponse, ClientError> {
        self.executor.post("/embeddings", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_serializes_by_shape() {
        let single = EmbeddingsRequest::new("openai/text-embedding-3-small", "hello");
        assert_eq!(
            serde_json::to_value(&single).unwrap(),
            json!({"model": "openai/text-embedding-3-small", "input": "hello"})
        );

        let batch = EmbeddingsRequest::new("m", vec!["a".to_string(), "b".to_string()]);
        assert_eq!(serde_json::to_value(&batch).unwrap()["input"], json!(["a", "b"]));
    }

    #[test]
    fn response_decodes() {
        let response: EmbeddingsResponse = serde_json::from_value(json!({
            "object": "list",
            "data": [{"object": "embedding", "embedding": [0.1, -0.2], "index": 0}],
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        }))
        .unwrap();
        assert_eq!(response.data[0].embedding, vec![0.1, -0.2]);
        assert_eq!(response.usage.unwrap().prompt_tokens, 3);
    }
}
