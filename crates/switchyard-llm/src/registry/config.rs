//! Per-provider configuration

use super::ProviderKind;
use crate::cost::{default_pricing, ModelPricing};
use crate::error::{Error, Result};
use crate::util::{mask_api_key, validate_api_key};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_core::RetryConfig;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default output token ceiling
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Spend and request ceilings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaLimit {
    /// Maximum spend per UTC day
    pub daily_limit: f64,
    /// Maximum spend per UTC month
    pub monthly_limit: f64,
    /// Maximum attempts in any rolling minute
    pub requests_per_minute: u32,
    /// Whether the limits are enforced
    pub enabled: bool,
}

impl Default for QuotaLimit {
    fn default() -> Self {
        Self::new(100.0, 2000.0, 60)
    }
}

impl QuotaLimit {
    /// Create enabled limits
    #[must_use]
    pub fn new(daily_limit: f64, monthly_limit: f64, requests_per_minute: u32) -> Self {
        Self {
            daily_limit,
            monthly_limit,
            requests_per_minute,
            enabled: true,
        }
    }

    /// Apply the fields set in `patch`
    pub fn apply(&mut self, patch: &QuotaLimitPatch) {
        if let Some(v) = patch.daily_limit {
            self.daily_limit = v;
        }
        if let Some(v) = patch.monthly_limit {
            self.monthly_limit = v;
        }
        if let Some(v) = patch.requests_per_minute {
            self.requests_per_minute = v;
        }
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
    }
}

/// Partial update of a [`QuotaLimit`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaLimitPatch {
    /// New daily limit
    pub daily_limit: Option<f64>,
    /// New monthly limit
    pub monthly_limit: Option<f64>,
    /// New per-minute request limit
    pub requests_per_minute: Option<u32>,
    /// Enable or disable enforcement
    pub enabled: Option<bool>,
}

/// Static configuration of one provider, immutable once registered
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    /// Provider id (unique within a registry)
    pub id: String,
    /// Provider family
    pub kind: ProviderKind,
    /// API key
    pub api_key: String,
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Default model
    pub model: String,
    /// Default temperature
    pub temperature: f32,
    /// Default output token ceiling
    pub max_tokens: u32,
    /// Cost per 1K input tokens of the default model
    pub input_price: f64,
    /// Cost per 1K output tokens of the default model
    pub output_price: f64,
    /// Whether the provider may be used
    pub enabled: bool,
    /// Retry behaviour
    pub retry: RetryConfig,
    /// Spend and request ceilings
    pub quota: QuotaLimit,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    /// Create a configuration with the kind's defaults
    ///
    /// `openai_compatible` has no default URL or model; set them with
    /// [`with_base_url`](Self::with_base_url) and [`with_model`](Self::with_model).
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ProviderKind, api_key: impl Into<String>) -> Self {
        let model = kind.default_model().unwrap_or_default().to_string();
        let (input_price, output_price) = default_pricing()
            .get(&model)
            .map_or((0.0, 0.0), |p| (p.input_cost_per_1k, p.output_cost_per_1k));

        Self {
            id: id.into(),
            kind,
            api_key: api_key.into(),
            base_url: kind.default_base_url().unwrap_or_default().to_string(),
            timeout: DEFAULT_TIMEOUT,
            model,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            input_price,
            output_price,
            enabled: true,
            retry: RetryConfig::default(),
            quota: kind.default_quota(),
        }
    }

    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set default temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set default max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set per-1K token prices of the default model
    #[must_use]
    pub fn with_pricing(mut self, input_price: f64, output_price: f64) -> Self {
        self.input_price = input_price;
        self.output_price = output_price;
        self
    }

    /// Enable or disable
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set retry behaviour
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set quota limits
    #[must_use]
    pub fn with_quota(mut self, quota: QuotaLimit) -> Self {
        self.quota = quota;
        self
    }

    /// Price entry for the default model
    #[must_use]
    pub fn model_pricing(&self) -> ModelPricing {
        ModelPricing::new(&self.model, &self.id, self.input_price, self.output_price)
    }

    /// Chat completions endpoint
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing key, URL or model, or
    /// nonsensical limits
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("provider id must not be empty".to_string()));
        }
        if let Some(msg) = validate_api_key(&self.api_key, &self.id) {
            return Err(Error::Config(msg));
        }
        if self.base_url.is_empty() {
            return Err(Error::Config(format!("{}: base_url is required", self.id)));
        }
        if self.model.is_empty() {
            return Err(Error::Config(format!("{}: model is required", self.id)));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config(format!("{}: timeout must be positive", self.id)));
        }
        if self.input_price < 0.0 || self.output_price < 0.0 {
            return Err(Error::Config(format!("{}: prices must not be negative", self.id)));
        }
        if self.quota.daily_limit < 0.0 || self.quota.monthly_limit < 0.0 {
            return Err(Error::Config(format!("{}: quota limits must not be negative", self.id)));
        }
        Ok(())
    }
}
