//! Per-model pricing table (SPEC_FULL.md §2): backfills `cost_usd` on token
//! metrics that arrive without a cost attribute, so the burn-rate calculator
//! always has a cost figure to aggregate.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingTable {
    #[serde(flatten)]
    prices: HashMap<String, ModelPrice>,
}

impl PricingTable {
    #[must_use]
    pub fn new(prices: HashMap<String, ModelPrice>) -> Self {
        Self { prices }
    }

    /// Estimate cost for `tokens` of `metric_name` (`input_tokens` or
    /// `output_tokens`) under `model`. Returns `None` if the model isn't priced.
    #[must_use]
    pub fn estimate_cost(&self, model: &str, metric_name: &str, tokens: f64) -> Option<f64> {
        let price = self.prices.get(model)?;
        let per_1k = if metric_name.starts_with("input") {
            price.input_per_1k
        } else if metric_name.starts_with("output") {
            price.output_per_1k
        } else {
            return None;
        };
        Some((tokens / 1000.0) * per_1k)
    }
}
