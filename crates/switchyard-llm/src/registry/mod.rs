//! Provider Registry
//!
//! Static per-provider configuration, loaded once at startup.

mod config;
mod kind;

pub use config::{
    ProviderConfig, QuotaLimit, QuotaLimitPatch, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT,
};
pub use kind::ProviderKind;

use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Ordered set of provider configurations
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<ProviderConfig>>,
}

impl ProviderRegistry {
    /// Build a registry, validating each configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid entries or duplicate ids
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>) -> Result<Self> {
        let mut providers: Vec<Arc<ProviderConfig>> = Vec::new();
        for config in configs {
            config.validate()?;
            if providers.iter().any(|p| p.id == config.id) {
                return Err(Error::Config(format!("duplicate provider id: {}", config.id)));
            }
            info!(
                provider = %config.id,
                kind = %config.kind,
                model = %config.model,
                enabled = config.enabled,
                "Provider registered"
            );
            providers.push(Arc::new(config));
        }
        Ok(Self { providers })
    }

    /// Look up a provider
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<ProviderConfig>> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Look up a provider or fail
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`] for unknown ids
    pub fn require(&self, id: &str) -> Result<&Arc<ProviderConfig>> {
        self.get(id)
            .ok_or_else(|| Error::NotConfigured(id.to_string()))
    }

    /// All providers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProviderConfig>> {
        self.providers.iter()
    }

    /// Enabled providers in registration order
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<ProviderConfig>> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Provider ids in registration order
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id.clone()).collect()
    }

    /// Number of providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
