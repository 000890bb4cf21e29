//! Model discovery backed by a time-bounded cache.
//!
//! [`ModelService::list`] serves the cached `GET /models` result; the other
//! queries filter that list without touching the cache.

pub mod cache;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::http::HttpExecutor;

pub use cache::{ModelCache, ModelSnapshot};

/// Response from `GET /models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub data: Vec<Model>,
    /// Pagination cursor. Not followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// A model offered by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub context_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_provider: Option<TopProvider>,
}

impl Model {
    /// Provider segment of the id (`anthropic` in `anthropic/claude-3`).
    pub fn provider(&self) -> Option<&str> {
        self.id.split_once('/').map(|(provider, _)| provider)
    }

    pub fn supports_image_input(&self) -> bool {
        self.architecture.as_ref().is_some_and(|arch| {
            arch.input_modalities
                .iter()
                .any(|m| m.eq_ignore_ascii_case("image"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Architecture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
}

/// Per-token prices, kept as the decimal strings the API sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_write: Option<String>,
}

impl Pricing {
    /// Prompt price per token. Missing or unparseable prices count as zero.
    pub fn prompt_price(&self) -> f64 {
        parse_price(self.prompt.as_deref())
    }

    /// Completion price per token. Missing or unparseable prices count as zero.
    pub fn completion_price(&self) -> f64 {
        parse_price(self.completion.as_deref())
    }

    pub fn combined_price(&self) -> f64 {
        self.prompt_price() + self.completion_price()
    }
}

fn parse_price(raw: Option<&str>) -> f64 {
    raw.and_then(|p| p.trim().parse().ok()).unwrap_or(0.0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopProvider {
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub max_completion_tokens: Option<u64>,
    #[serde(default)]
    pub is_moderated: bool,
}

/// Model with the lowest prompt + completion price. Models without pricing
/// are skipped; on a tie the earliest model wins.
pub fn cheapest(models: &[Model]) -> Option<&Model> {
    let mut best: Option<(&Model, f64)> = None;
    for model in models {
        let Some(pricing) = &model.pricing else {
            continue;
        };
        let price = pricing.combined_price();
        match best {
            Some((_, best_price)) if price >= best_price => {}
            _ => best = Some((model, price)),
        }
    }
    best.map(|(model, _)| model)
}

/// Models whose id is prefixed `<provider>/`, case-insensitively.
pub fn by_provider<'a>(models: &'a [Model], provider: &str) -> Vec<&'a Model> {
    models
        .iter()
        .filter(|m| {
            m.provider()
                .is_some_and(|p| p.eq_ignore_ascii_case(provider))
        })
        .collect()
}

pub fn by_context_length(models: &[Model], min_tokens: u64) -> Vec<&Model> {
    models
        .iter()
        .filter(|m| m.context_length >= min_tokens)
        .collect()
}

pub fn supports_vision(models: &[Model]) -> Vec<&Model> {
    models.iter().filter(|m| m.supports_image_input()).collect()
}

/// Model listing and discovery.
#[derive(Debug, Clone)]
pub struct ModelService {
    executor: HttpExecutor,
    cache: Arc<ModelCache>,
}

impl ModelService {
    pub fn new(executor: HttpExecutor, cache: Arc<ModelCache>) -> Self {
        Self { executor, cache }
    }

    /// All available models, cached for the configured TTL.
    pub async fn list(&self) -> Result<ModelSnapshot, ClientError> {
        self.cache
            .get_or_fetch(|| async {
                let response: ListResponse = self.executor.get("/models").await?;
                Ok::<_, ClientError>(response.data)
            })
            .await
    }

    /// Discard the cached list.
    pub async fn refresh(&self) -> Result<ModelSnapshot, ClientError> {
        self.cache.invalidate().await;
        self.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Model, ClientError> {
        self.list()
            .await?
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ClientError::ModelNotFound(id.to_string()))
    }

    pub async fn by_provider(&self, provider: &str) -> Result<Vec<Model>, ClientError> {
        let models = self.list().await?;
        Ok(by_provider(&models, provider).into_iter().cloned().collect())
    }

    pub async fn by_context_length(&self, min_tokens: u64) -> Result<Vec<Model>, ClientError> {
        let models = self.list().await?;
        Ok(by_context_length(&models, min_tokens)
            .into_iter()
            .cloned()
            .collect())
    }

    /// `None` when no listed model has pricing.
    pub async fn cheapest(&self) -> Result<Option<Model>, ClientError> {
        let models = self.list().await?;
        Ok(cheapest(&models).cloned())
    }

    pub async fn supports_vision(&self) -> Result<Vec<Model>, ClientError> {
        let models = self.list().await?;
        Ok(supports_vision(&models).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn priced(id: &str, prompt: &str, completion: &str) -> Model {
        Model {
            id: id.to_string(),
            pricing: Some(Pricing {
                prompt: Some(prompt.to_string()),
                completion: Some(completion.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn unpriced(id: &str) -> Model {
        Model {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn cheapest_skips_unpriced_models() {
        let models = vec![
            priced("A", "0.001", "0.001"),
            priced("B", "0.0005", "0.0005"),
            unpriced("C"),
        ];
        assert_eq!(cheapest(&models).unwrap().id, "B");
    }

    #[test]
    fn cheapest_prefers_first_on_tie() {
        let models = vec![unpriced("X"), priced("A", "0.1", "0"), priced("B", "0", "0.1")];
        assert_eq!(cheapest(&models).unwrap().id, "A");
        assert!(cheapest(&[unpriced("X")]).is_none());
        assert!(cheapest(&[]).is_none());
    }

    #[test]
    fn filters() {
        let vision: Model = serde_json::from_value(json!({
            "id": "OpenAI/gpt-4o",
            "name": "GPT-4o",
            "context_length": 128000,
            "architecture": {"modality": "text+image->text", "input_modalities": ["text", "Image"]}
        }))
        .unwrap();
        let text_only: Model = serde_json::from_value(json!({
            "id": "anthropic/claude-3-haiku",
            "context_length": 200000,
            "architecture": {"input_modalities": ["text"]}
        }))
        .unwrap();
        let openai_lookalike = unpriced("openai-community/gpt2");
        let models = vec![vision, text_only, openai_lookalike];

        let openai: Vec<_> = by_provider(&models, "openai")
            .into_iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(openai, vec!["OpenAI/gpt-4o"]);

        let long: Vec<_> = by_context_length(&models, 150_000)
            .into_iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(long, vec!["anthropic/claude-3-haiku"]);

        let with_images = supports_vision(&models);
        assert_eq!(with_images.len(), 1);
        assert_eq!(with_images[0].id, "OpenAI/gpt-4o");
    }

    #[test]
    fn pricing_parses_decimal_strings() {
        let pricing = Pricing {
            prompt: Some("0.000003".into()),
            completion: Some("bogus".into()),
            ..Default::default()
        };
        assert_eq!(pricing.prompt_price(), 0.000003);
        assert_eq!(pricing.completion_price(), 0.0);
    }

    #[test]
    fn list_response_decodes() {
        let response: ListResponse = serde_json::from_value(json!({
            "data": [{
                "id": "meta-llama/llama-3-8b",
                "name": "Llama 3 8B",
                "context_length": 8192,
                "pricing": {"prompt": "0.0000001", "completion": "0.0000002"},
                "top_provider": {"context_length": 8192, "max_completion_tokens": null, "is_moderated": false}
            }]
        }))
        .unwrap();
        let model = &response.data[0];
        assert_eq!(model.provider(), Some("meta-llama"));
        assert_eq!(model.top_provider.as_ref().unwrap().max_completion_tokens, None);
        assert!(response.next.is_none());
    }
}
