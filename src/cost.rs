//! Cost estimation from cached model pricing.

use crate::error::ClientError;
use crate::models::{Model, ModelService};

#[derive(Debug, Clone)]
pub struct CostService {
    models: ModelService,
}

impl CostService {
    pub fn new(models: ModelService) -> Self {
        Self { models }
    }

    /// Estimated charge for `input_tokens` prompt tokens and `output_tokens`
    /// completion tokens on `model_id`.
    pub async fn estimate(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<f64, ClientError> {
        let models = self.models.list().await?;
        let model = models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| ClientError::ModelNotFound(model_id.to_string()))?;
        estimate_for(model, input_tokens, output_tokens)
    }
}

/// Prices are per token.
pub fn estimate_for(model: &Model, input_tokens: u64, output_tokens: u64) -> Result<f64, ClientError> {
    let pricing = model
        .pricing
        .as_ref()
        .ok_or_else(|| ClientError::PricingUnavailable(model.id.clone()))?;
    Ok(input_tokens as f64 * pricing.prompt_price() + output_tokens as f64 * pricing.completion_price())
}
