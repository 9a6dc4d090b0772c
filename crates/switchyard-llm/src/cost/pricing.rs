//! Model Pricing - per-1K-token prices
//!
//! Prices are in the billing currency of the configured providers (CNY for
//! the built-in defaults).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::warn;

// ============================================================================
// Default Model Pricing (per 1K tokens, CNY)
// ============================================================================

/// deepseek-chat input cost per 1K tokens
pub const DEEPSEEK_CHAT_INPUT_COST: f64 = 0.0014;
/// deepseek-chat output cost per 1K tokens
pub const DEEPSEEK_CHAT_OUTPUT_COST: f64 = 0.0028;
/// glm-4 input cost per 1K tokens
pub const GLM4_INPUT_COST: f64 = 0.1;
/// glm-4 output cost per 1K tokens
pub const GLM4_OUTPUT_COST: f64 = 0.1;
/// qwen-turbo input cost per 1K tokens
pub const QWEN_TURBO_INPUT_COST: f64 = 0.003;
/// qwen-turbo output cost per 1K tokens
pub const QWEN_TURBO_OUTPUT_COST: f64 = 0.006;
/// moonshot-v1-8k input cost per 1K tokens
pub const MOONSHOT_8K_INPUT_COST: f64 = 0.012;
/// moonshot-v1-8k output cost per 1K tokens
pub const MOONSHOT_8K_OUTPUT_COST: f64 = 0.012;

/// Price of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model name
    pub model: String,
    /// Provider id the price was registered for
    pub provider: String,
    /// Cost per 1K input tokens
    pub input_cost_per_1k: f64,
    /// Cost per 1K output tokens
    pub output_cost_per_1k: f64,
}

impl ModelPricing {
    /// Create a price entry
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        provider: impl Into<String>,
        input_cost_per_1k: f64,
        output_cost_per_1k: f64,
    ) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            input_cost_per_1k,
            output_cost_per_1k,
        }
    }

    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (f64::from(input_tokens) / 1000.0) * self.input_cost_per_1k;
        let output_cost = (f64::from(output_tokens) / 1000.0) * self.output_cost_per_1k;
        input_cost + output_cost
    }
}

/// Default pricing for the built-in provider models
#[must_use]
pub fn default_pricing() -> HashMap<String, ModelPricing> {
    [
        ModelPricing::new(
            "deepseek-chat",
            "deepseek",
            DEEPSEEK_CHAT_INPUT_COST,
            DEEPSEEK_CHAT_OUTPUT_COST,
        ),
        ModelPricing::new("glm-4", "zhipu", GLM4_INPUT_COST, GLM4_OUTPUT_COST),
        ModelPricing::new(
            "qwen-turbo",
            "ali",
            QWEN_TURBO_INPUT_COST,
            QWEN_TURBO_OUTPUT_COST,
        ),
        ModelPricing::new(
            "moonshot-v1-8k",
            "moonshot",
            MOONSHOT_8K_INPUT_COST,
            MOONSHOT_8K_OUTPUT_COST,
        ),
    ]
    .into_iter()
    .map(|p| (p.model.clone(), p))
    .collect()
}

/// Model name -> price lookup
#[derive(Debug)]
pub struct PricingTable {
    models: RwLock<HashMap<String, ModelPricing>>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PricingTable {
    /// Empty table
    #[must_use]
    pub fn empty() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Table seeded with [`default_pricing`]
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            models: RwLock::new(default_pricing()),
        }
    }

    /// Insert or replace a model's price
    pub fn update(&self, pricing: ModelPricing) {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pricing.model.clone(), pricing);
    }

    /// Price for a model
    #[must_use]
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    /// Cost of a call; unknown models cost nothing and log a warning
    #[must_use]
    pub fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        match self.get(model) {
            Some(pricing) => pricing.calculate_cost(input_tokens, output_tokens),
            None => {
                warn!(provider = %provider, model = %model, "No pricing for model, cost recorded as 0");
                0.0
            }
        }
    }
}
