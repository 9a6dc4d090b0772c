//! Router-facing types

use crate::quota::QuotaStatus;
use crate::registry::ProviderKind;
use crate::stats::ProviderStats;
use serde::{Deserialize, Serialize};
use switchyard_core::CircuitSnapshot;

/// Health of one provider at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    /// Provider id
    pub provider: String,
    /// Provider family
    pub kind: ProviderKind,
    /// Whether the provider takes part in routing
    pub enabled: bool,
    /// Circuit state, failure count and next probe
    pub circuit: CircuitSnapshot,
    /// Call statistics
    pub stats: ProviderStats,
    /// Spend and rate usage; absent when the store could not be read
    pub quota: Option<QuotaStatus>,
}

/// Options for [`Orchestrator::call`](super::Orchestrator::call)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Provider to try first
    #[serde(default)]
    pub preferred_provider: Option<String>,
    /// Model override
    #[serde(default)]
    pub model: Option<String>,
    /// Temperature override
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Output token ceiling override
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl CallOptions {
    /// Set the preferred provider
    #[must_use]
    pub fn with_preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    /// Set the model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature override
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token ceiling
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
