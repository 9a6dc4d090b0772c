//! Application configuration types

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use switchyard_core::{CircuitBreakerConfig, RetryConfig, DEFAULT_KEY_PREFIX};
use switchyard_llm::{ProviderConfig, ProviderKind, QuotaLimitPatch};
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Coordination store
    #[serde(default)]
    pub store: StoreSettings,
    /// Circuit breaker thresholds, shared by every provider
    #[serde(default)]
    pub circuit: CircuitSettings,
    /// Providers by id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Coordination store settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Redis URL; unset means an in-process store
    #[serde(default)]
    pub url: Option<String>,
    /// Prefix applied to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Admit requests while the store is unreachable
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_fail_open() -> bool {
    true
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_key_prefix(),
            fail_open: default_fail_open(),
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitSettings {
    /// Consecutive failures that open a circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cool-down before a probe, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_ms() -> u64 {
    60_000
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl CircuitSettings {
    /// Breaker configuration
    #[must_use]
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(self.failure_threshold)
            .with_cooldown(Duration::from_millis(self.cooldown_ms))
    }
}

/// Settings of one provider; unset fields take the kind's defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    /// Provider family; defaults to the id when it names a kind
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    /// API key; read from the kind's env var when unset
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-attempt timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Default model
    #[serde(default)]
    pub model: Option<String>,
    /// Default temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Default output token ceiling
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Cost per 1K input tokens
    #[serde(default)]
    pub input_price: Option<f64>,
    /// Cost per 1K output tokens
    #[serde(default)]
    pub output_price: Option<f64>,
    /// Whether the provider takes part in routing
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Retry behaviour
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Quota overrides
    #[serde(default)]
    pub quota: QuotaLimitPatch,
}

impl ProviderSettings {
    /// Resolve into a provider configuration
    ///
    /// Returns `Ok(None)` when no API key is available; such providers are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns error when the kind cannot be determined
    pub fn resolve(
        &self,
        id: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<ProviderConfig>> {
        let Some(kind) = self.kind.or_else(|| ProviderKind::from_id(id)) else {
            bail!("provider '{id}' needs a `kind`");
        };

        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env(kind.api_key_env()).filter(|k| !k.trim().is_empty()));
        let Some(api_key) = api_key else {
            warn!(
                provider = %id,
                env = kind.api_key_env(),
                "No API key configured, provider skipped"
            );
            return Ok(None);
        };

        let mut config = ProviderConfig::new(id, kind, api_key);
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(t) = self.temperature {
            config = config.with_temperature(t);
        }
        if let Some(n) = self.max_tokens {
            config = config.with_max_tokens(n);
        }
        if self.input_price.is_some() || self.output_price.is_some() {
            let input = self.input_price.unwrap_or(config.input_price);
            let output = self.output_price.unwrap_or(config.output_price);
            config = config.with_pricing(input, output);
        }
        if let Some(enabled) = self.enabled {
            config = config.with_enabled(enabled);
        }
        if let Some(retry) = &self.retry {
            config = config.with_retry(retry.clone());
        }
        let mut quota = config.quota.clone();
        quota.apply(&self.quota);
        Ok(Some(config.with_quota(quota)))
    }
}

impl AppConfig {
    /// Resolve every provider that has a key
    ///
    /// # Errors
    ///
    /// Returns error for providers whose kind cannot be determined
    pub fn provider_configs(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<ProviderConfig>> {
        let mut out = Vec::new();
        for (id, settings) in &self.providers {
            if let Some(config) = settings.resolve(id, &env)? {
                out.push(config);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::loader::DEFAULT_CONFIG;

    const KEY: &str = "sk-test-0123456789";

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert!(config.store.url.is_none());
        assert_eq!(config.store.key_prefix, "switchyard:");
        assert!(config.store.fail_open);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.circuit.cooldown_ms, 60_000);
        for id in ["deepseek", "zhipu", "ali", "moonshot"] {
            assert!(config.providers.contains_key(id), "{id}");
        }
    }

    #[test]
    fn test_providers_without_keys_are_skipped() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert!(config.provider_configs(no_env).unwrap().is_empty());

        let configs = config
            .provider_configs(|var| (var == "ZHIPU_API_KEY").then(|| KEY.to_string()))
            .unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].id, "zhipu");
        assert_eq!(configs[0].api_key, KEY);
    }

    #[test]
    fn test_settings_override_kind_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [providers.deepseek]
            api_key = "sk-test-0123456789"
            timeout_ms = 5000
            model = "deepseek-coder"
            output_price = 0.01

            [providers.deepseek.retry]
            max_attempts = 5

            [providers.deepseek.quota]
            daily_limit = 5.0
            "#,
        )
        .unwrap();

        let configs = config.provider_configs(no_env).unwrap();
        let deepseek = &configs[0];
        assert_eq!(deepseek.kind, ProviderKind::Deepseek);
        assert_eq!(deepseek.timeout, Duration::from_secs(5));
        assert_eq!(deepseek.model, "deepseek-coder");
        assert!((deepseek.input_price - 0.0014).abs() < 1e-12);
        assert!((deepseek.output_price - 0.01).abs() < 1e-12);
        assert_eq!(deepseek.retry.max_attempts, 5);
        assert_eq!(deepseek.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(deepseek.quota.daily_limit, 5.0);
        assert_eq!(deepseek.quota.monthly_limit, 1000.0);
        assert_eq!(deepseek.quota.requests_per_minute, 60);
    }

    #[test]
    fn test_custom_provider_needs_kind() {
        let config: AppConfig = toml::from_str(
            r#"
            [providers.local]
            api_key = "sk-test-0123456789"
            base_url = "http://localhost:8080/v1"
            model = "llama3"
            "#,
        )
        .unwrap();
        assert!(config.provider_configs(no_env).is_err());

        let config: AppConfig = toml::from_str(
            r#"
            [providers.local]
            kind = "openai_compatible"
            api_key = "sk-test-0123456789"
            base_url = "http://localhost:8080/v1"
            model = "llama3"
            "#,
        )
        .unwrap();
        let configs = config.provider_configs(no_env).unwrap();
        assert_eq!(configs[0].endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_circuit_settings() {
        let settings = CircuitSettings {
            failure_threshold: 3,
            cooldown_ms: 1500,
        };
        let config = settings.to_config();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.cooldown, Duration::from_millis(1500));
    }
}
