//! Provider routing preferences.
//!
//! Load balancing across upstream providers happens server-side; these
//! preferences only steer it.

use serde::{Deserialize, Serialize};

/// Provider routing preferences sent as the `provider` field of a request.
///
/// # Example
/// ```rust
/// use openrouter::routing::{ProviderPreferences, ProviderSort};
///
/// let prefs = ProviderPreferences::default()
///     .with_order(["anthropic", "openai"])
///     .with_sort(ProviderSort::Price)
///     .with_allow_fallbacks(false);
/// assert_eq!(prefs.order, vec!["anthropic", "openai"]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderPreferences {
    /// Providers to try, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
    /// Only route to providers supporting every request parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_parameters: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_collection: Option<DataCollection>,
    /// Zero data retention endpoints only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zdr: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<ProviderSort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_min_throughput: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_max_latency: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<MaxPrice>,
}

impl ProviderPreferences {
    pub fn with_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_fallbacks(mut self, allow: bool) -> Self {
        self.allow_fallbacks = Some(allow);
        self
    }

    pub fn with_sort(mut self, sort: ProviderSort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_max_price(mut self, max_price: MaxPrice) -> Self {
        self.max_price = Some(max_price);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataCollection {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSort {
    Price,
    Throughput,
    Latency,
}

/// A performance threshold: a single value or per-percentile cutoffs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Threshold {
    Value(f64),
    Percentiles(Percentiles),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Percentiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p75: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99: Option<f64>,
}

/// Upper bound on the per-token price a request may be routed at.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MaxPrice {
    #[serde(rename = "prompt", default, skip_serializing_if = "Option::is_none")]
    pub prompt_price_per_token: Option<f64>,
    #[serde(rename = "completion", default, skip_serializing_if = "Option::is_none")]
    pub completion_price_per_token: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_preferences_serialize_to_empty_object() {
        let value = serde_json::to_value(ProviderPreferences::default()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn preferences_serialize_by_shape() {
        let prefs = ProviderPreferences {
            data_collection: Some(DataCollection::Deny),
            preferred_min_throughput: Some(Threshold::Value(50.0)),
            preferred_max_latency: Some(Threshold::Percentiles(Percentiles {
                p90: Some(2.5),
                ..Default::default()
            })),
            ..ProviderPreferences::default()
                .with_order(["groq"])
                .with_sort(ProviderSort::Throughput)
                .with_max_price(MaxPrice {
                    prompt_price_per_token: Some(1.0),
                    completion_price_per_token: None,
                })
        };
        let value = serde_json::to_value(&prefs).unwrap();
        assert_eq!(
            value,
            json!({
                "order": ["groq"],
                "data_collection": "deny",
                "sort": "throughput",
                "preferred_min_throughput": 50.0,
                "preferred_max_latency": {"p90": 2.5},
                "max_price": {"prompt": 1.0}
            })
        );
    }
}
