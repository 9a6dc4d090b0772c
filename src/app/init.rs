//! Application wiring
//!
//! Builds the coordination store, quota manager and orchestrator from an
//! [`AppConfig`].

use super::config::{AppConfig, StoreSettings};
use anyhow::{Context, Result};
use std::sync::Arc;
use switchyard_core::{CoordinationStore, MemoryStore, RedisStore, SharedStore};
use switchyard_llm::{
    CostTracker, HttpExecutor, MultiSink, Orchestrator, PricingTable, ProviderRegistry,
    QuotaManager, SharedSink, TracingSink,
};
use tracing::{info, warn};

/// Everything the commands need
pub struct App {
    /// Request router
    pub orchestrator: Orchestrator,
    /// Cost records of this process
    pub costs: Arc<CostTracker>,
}

/// Connect the coordination store
///
/// An unreachable Redis falls back to an in-process store.
pub async fn init_store(settings: &StoreSettings) -> SharedStore {
    let memory = || -> SharedStore {
        Arc::new(MemoryStore::new().with_prefix(settings.key_prefix.clone()))
    };

    let Some(url) = settings.url.as_deref() else {
        warn!("No store URL configured, quota limits are per-process only");
        return memory();
    };

    let store = match RedisStore::with_prefix(url, &settings.key_prefix) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Invalid Redis URL, using in-process store");
            return memory();
        }
    };

    match store.ping().await {
        Ok(()) => {
            info!("Connected to Redis coordination store");
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "Redis unreachable, using in-process store");
            memory()
        }
    }
}

/// Build the application from configuration
///
/// `env` looks up provider API keys that the configuration leaves unset.
pub async fn init_app(config: &AppConfig, env: impl Fn(&str) -> Option<String>) -> Result<App> {
    let providers = config.provider_configs(env)?;
    if providers.is_empty() {
        warn!("No providers configured; set an API key such as DEEPSEEK_API_KEY");
    }
    let registry = ProviderRegistry::new(providers).context("Invalid provider configuration")?;
    info!(providers = ?registry.ids(), "Provider registry initialized");

    let store = init_store(&config.store).await;

    let costs = Arc::new(CostTracker::new());
    let sink: SharedSink = Arc::new(MultiSink::new(vec![
        Arc::new(TracingSink),
        costs.clone(),
    ]));

    let pricing = Arc::new(PricingTable::with_defaults());
    let quota = Arc::new(
        QuotaManager::new(store, pricing)
            .with_fail_open(config.store.fail_open)
            .with_sink(sink.clone()),
    );
    let executor = Arc::new(HttpExecutor::new().context("Failed to build HTTP client")?);

    let orchestrator = Orchestrator::new(registry, executor, quota)
        .with_circuit_config(config.circuit.to_config())
        .with_sink(sink);

    Ok(App {
        orchestrator,
        costs,
    })
}
