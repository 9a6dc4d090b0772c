//! Orchestrator - fallback routing across providers
//!
//! For every request the orchestrator ranks the enabled providers, then walks
//! the ranking: circuit admission, quota admission, retried execution. The
//! first success wins; otherwise the last observed error is returned.

use super::types::{CallOptions, ProviderHealth};
use crate::completion::{CompletionRequest, CompletionResponse, RoutedResponse};
use crate::error::{ErrorKind, ProviderError, Result};
use crate::executor::{resolve_model, RequestExecutor};
use crate::message::Message;
use crate::quota::QuotaManager;
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::sink::SharedSink;
use crate::stats::{ProviderStats, StatsRecorder};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use switchyard_core::{
    retry_with_backoff, system_clock, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot,
    JitterSource, RandomJitter, SharedClock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Routes requests across providers with retries, circuit breaking and quotas
pub struct Orchestrator {
    registry: ProviderRegistry,
    executor: Arc<dyn RequestExecutor>,
    quota: Arc<QuotaManager>,
    stats: StatsRecorder,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    circuit_config: CircuitBreakerConfig,
    jitter: Arc<dyn JitterSource>,
    clock: SharedClock,
    sink: Option<SharedSink>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.registry.ids())
            .field("circuit_config", &self.circuit_config)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator and register every provider's limits with
    /// `quota`
    #[must_use]
    pub fn new(
        registry: ProviderRegistry,
        executor: Arc<dyn RequestExecutor>,
        quota: Arc<QuotaManager>,
    ) -> Self {
        for config in registry.iter() {
            quota.register(config);
        }
        let clock = system_clock();
        Self {
            registry,
            executor,
            quota,
            stats: StatsRecorder::with_clock(clock.clone()),
            breakers: DashMap::new(),
            circuit_config: CircuitBreakerConfig::default(),
            jitter: Arc::new(RandomJitter),
            clock,
            sink: None,
        }
    }

    /// Set circuit breaker thresholds
    #[must_use]
    pub fn with_circuit_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_config = config;
        self
    }

    /// Set the retry jitter source
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Read time from `clock` for circuits and statistics
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.stats = StatsRecorder::with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Push health snapshots to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Provider registry
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Quota manager
    #[must_use]
    pub fn quota(&self) -> &Arc<QuotaManager> {
        &self.quota
    }

    fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_clock(
                    provider,
                    self.circuit_config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Send a request to one provider
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`](crate::Error::NotConfigured) for unknown providers and
    /// [`Error::Provider`](crate::Error::Provider) when the provider is disabled, rejected by its
    /// circuit or quota, or fails after retries.
    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    pub async fn send_request(
        &self,
        provider: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let config = self.registry.require(provider)?;
        if !config.enabled {
            return Err(ProviderError::new(
                ErrorKind::ServiceUnavailable,
                provider,
                "provider is disabled",
            )
            .with_retryable(false)
            .into());
        }
        Ok(self.try_provider(config, request).await?)
    }

    /// Send a request, falling back across providers
    ///
    /// Candidates are the enabled providers ranked by success rate and
    /// latency, with `preferred` moved to the front when eligible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`](crate::Error::Provider) with the last observed error when every
    /// candidate fails, or a `service_unavailable` error when no provider
    /// is enabled.
    #[instrument(skip(self, request), fields(messages = request.messages.len()))]
    pub async fn send_with_fallback(
        &self,
        request: &CompletionRequest,
        preferred: Option<&str>,
    ) -> Result<RoutedResponse> {
        let eligible: Vec<String> = self.registry.enabled().map(|p| p.id.clone()).collect();
        if eligible.is_empty() {
            return Err(ProviderError::no_providers("no enabled providers").into());
        }

        let ranked = self.stats.rank(&eligible, preferred);
        debug!(order = ?ranked, "Fallback order");

        let mut last_error: Option<ProviderError> = None;
        for (position, provider) in ranked.iter().enumerate() {
            let Some(config) = self.registry.get(provider) else {
                continue;
            };

            match self.try_provider(config, request).await {
                Ok(response) => {
                    if position > 0 {
                        info!(provider = %provider, position, "Request served by fallback provider");
                    }
                    return Ok(RoutedResponse {
                        response,
                        used_provider: provider.clone(),
                    });
                }
                Err(e) => {
                    if e.kind.is_provider_specific() {
                        warn!(provider = %provider, kind = %e.kind, error = %e.message, "Provider-specific failure, trying next provider");
                    } else {
                        warn!(provider = %provider, kind = %e.kind, error = %e.message, "Provider failed, trying next provider");
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ProviderError::no_providers("no provider could be tried"));
        warn!(provider = %error.provider, kind = %error.kind, "All providers failed");
        Err(error.into())
    }

    /// [`send_with_fallback`](Self::send_with_fallback) that gives up when
    /// `cancel` fires
    ///
    /// The in-flight attempt is dropped without touching statistics or the
    /// circuit; a half-open probe it held is released.
    ///
    /// # Errors
    ///
    /// As `send_with_fallback`, plus a non-retryable `timeout` error when
    /// cancelled.
    pub async fn send_with_fallback_cancellable(
        &self,
        request: &CompletionRequest,
        preferred: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RoutedResponse> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Request cancelled by caller");
                Err(ProviderError::cancelled("router").into())
            }
            result = self.send_with_fallback(request, preferred) => result,
        }
    }

    /// Build a request from `messages` and `options` and route it
    ///
    /// # Errors
    ///
    /// As [`send_with_fallback`](Self::send_with_fallback).
    pub async fn call(&self, messages: Vec<Message>, options: CallOptions) -> Result<RoutedResponse> {
        let request = CompletionRequest {
            messages,
            model: options.model,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        self.send_with_fallback(&request, options.preferred_provider.as_deref())
            .await
    }

    // ========================================================================
    // Single provider pipeline
    // ========================================================================

    async fn try_provider(
        &self,
        config: &ProviderConfig,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let breaker = self.breaker(&config.id);
        let permit = breaker.try_acquire().map_err(|open| {
            debug!(provider = %config.id, "Skipping provider, circuit open");
            ProviderError::circuit_open(&open)
        })?;

        let estimated_cost = self.quota.estimate_cost(config, request);
        if let Err(e) = self.quota.can_make_request(&config.id, estimated_cost).await {
            debug!(provider = %config.id, kind = %e.kind, estimated_cost, "Skipping provider, quota");
            return Err(e);
        }

        let breaker_ref: &CircuitBreaker = &breaker;
        let result = retry_with_backoff(
            &config.retry,
            self.jitter.as_ref(),
            move |attempt| async move {
                if attempt > 1 {
                    self.quota.record_attempt(&config.id).await;
                }
                let started = Instant::now();
                let outcome = self.executor.execute(config, request).await;
                let latency = started.elapsed();
                match &outcome {
                    Ok(_) => {
                        self.stats.record_success(&config.id, latency);
                        breaker_ref.record_success();
                    }
                    Err(e) => {
                        debug!(provider = %config.id, attempt, kind = %e.kind, "Attempt failed");
                        self.stats.record_failure(&config.id, latency, e);
                        breaker_ref.record_failure();
                    }
                }
                outcome.map(|response| (response, latency))
            },
            |_| !breaker_ref.is_open(),
        )
        .await;
        drop(permit);

        match result {
            Ok((response, latency)) => {
                let model = resolve_model(config, request);
                self.quota
                    .record_usage(&config.id, model, response.usage, latency, true)
                    .await;
                Ok(response)
            }
            Err(e) => {
                debug!(provider = %config.id, attempts = e.attempts, "Provider exhausted");
                Err(e.last_error)
            }
        }
    }

    // ========================================================================
    // Health & admin views
    // ========================================================================

    /// Statistics per provider id
    #[must_use]
    pub fn stats(&self) -> HashMap<String, ProviderStats> {
        self.stats.all()
    }

    /// Circuit snapshot per registered provider id
    #[must_use]
    pub fn circuit_states(&self) -> HashMap<String, CircuitSnapshot> {
        self.registry
            .iter()
            .map(|p| (p.id.clone(), self.breaker(&p.id).snapshot()))
            .collect()
    }

    /// Close a provider's circuit
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`](crate::Error::NotConfigured) for unknown providers
    pub fn reset_circuit(&self, provider: &str) -> Result<()> {
        self.registry.require(provider)?;
        self.breaker(provider).reset();
        info!(provider = %provider, "Circuit reset");
        Ok(())
    }

    /// Health of every registered provider, in registration order
    pub async fn health_snapshot(&self) -> Vec<ProviderHealth> {
        let mut out = Vec::with_capacity(self.registry.len());
        for config in self.registry.iter() {
            let quota = match self.quota.quota_status_for(&config.id).await {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(provider = %config.id, error = %e, "Quota status unavailable");
                    None
                }
            };
            out.push(ProviderHealth {
                provider: config.id.clone(),
                kind: config.kind,
                enabled: config.enabled,
                circuit: self.breaker(&config.id).snapshot(),
                stats: self.stats.get(&config.id).unwrap_or_default(),
                quota,
            });
        }
        out
    }

    /// Take a health snapshot and push it to the sink
    pub async fn publish_health(&self) -> Vec<ProviderHealth> {
        let snapshot = self.health_snapshot().await;
        if let Some(sink) = &self.sink {
            sink.record_health(&snapshot);
        }
        snapshot
    }
}
