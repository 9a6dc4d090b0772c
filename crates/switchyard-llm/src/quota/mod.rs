//! Spend quotas and request-rate admission
//!
//! Daily and monthly spend live in the coordination store under keys that
//! embed the UTC date, so a new day or month starts from zero without any
//! reset job. The per-minute limit is a sliding window evaluated atomically
//! by the store.

use crate::completion::{CompletionRequest, TokenUsage};
use crate::cost::{CostRecord, PricingTable};
use crate::error::{ErrorKind, ProviderError, Result};
use crate::executor::{resolve_max_tokens, resolve_model};
use crate::registry::{ProviderConfig, QuotaLimit, QuotaLimitPatch};
use crate::sink::SharedSink;
use crate::token::count_message_tokens;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{
    system_clock, RateLimitConfig, SharedClock, SharedStore, SlidingWindowLimiter,
};
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Length of the request-rate window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
/// Expiry of a daily spend counter
pub const DAILY_KEY_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);
/// Expiry of a monthly spend counter
pub const MONTHLY_KEY_TTL: Duration = Duration::from_secs(32 * 24 * 60 * 60);

const WARNING_RATIO: f64 = 0.7;
const CRITICAL_RATIO: f64 = 0.9;

// ============================================================================
// Status
// ============================================================================

/// How close a provider is to its spend limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaLevel {
    /// Below 70% of both limits
    Normal,
    /// Above 70% of either limit
    Warning,
    /// Above 90% of either limit
    Critical,
}

impl QuotaLevel {
    /// Level for the given usage ratios
    #[must_use]
    pub fn from_ratios(daily: f64, monthly: f64) -> Self {
        let worst = daily.max(monthly);
        if worst > CRITICAL_RATIO {
            Self::Critical
        } else if worst > WARNING_RATIO {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for QuotaLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage report for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    /// Provider id
    pub provider: String,
    /// Spend today
    pub daily_used: f64,
    /// Daily ceiling
    pub daily_limit: f64,
    /// Daily headroom, floored at 0
    pub daily_remaining: f64,
    /// Spend this month
    pub monthly_used: f64,
    /// Monthly ceiling
    pub monthly_limit: f64,
    /// Monthly headroom, floored at 0
    pub monthly_remaining: f64,
    /// Attempts in the current rolling minute
    pub requests_this_minute: u32,
    /// Per-minute ceiling
    pub requests_per_minute: u32,
    /// Whether limits are enforced
    pub enabled: bool,
    /// Alert level
    pub level: QuotaLevel,
}

fn ratio(used: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        used / limit
    } else {
        0.0
    }
}

// ============================================================================
// QuotaManager
// ============================================================================

/// Per-provider spend and rate accounting over a coordination store
pub struct QuotaManager {
    store: SharedStore,
    limiter: SlidingWindowLimiter,
    clock: SharedClock,
    pricing: Arc<PricingTable>,
    sink: Option<SharedSink>,
    limits: DashMap<String, QuotaLimit>,
    fail_open: bool,
    store_degraded: AtomicBool,
}

impl std::fmt::Debug for QuotaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaManager")
            .field("backend", &self.store.backend())
            .field("providers", &self.limits.len())
            .field("has_sink", &self.sink.is_some())
            .field("fail_open", &self.fail_open)
            .finish_non_exhaustive()
    }
}

impl QuotaManager {
    /// Create a manager over `store`
    #[must_use]
    pub fn new(store: SharedStore, pricing: Arc<PricingTable>) -> Self {
        Self::with_clock(store, pricing, system_clock())
    }

    /// Create a manager reading time from `clock`
    #[must_use]
    pub fn with_clock(store: SharedStore, pricing: Arc<PricingTable>, clock: SharedClock) -> Self {
        Self {
            limiter: SlidingWindowLimiter::with_clock(store.clone(), clock.clone()),
            store,
            clock,
            pricing,
            sink: None,
            limits: DashMap::new(),
            fail_open: true,
            store_degraded: AtomicBool::new(false),
        }
    }

    /// Admit (`true`, default) or reject requests while the store is failing
    #[must_use]
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Whether the last admission lookup hit a store error
    #[must_use]
    pub fn store_degraded(&self) -> bool {
        self.store_degraded.load(Ordering::Relaxed)
    }

    /// Emit cost records to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register a provider's limits and its default model price
    pub fn register(&self, config: &ProviderConfig) {
        self.pricing.update(config.model_pricing());
        self.limits.insert(config.id.clone(), config.quota.clone());
    }

    /// Limits currently applied to `provider`
    #[must_use]
    pub fn limit(&self, provider: &str) -> QuotaLimit {
        self.limits
            .get(provider)
            .map(|l| l.value().clone())
            .unwrap_or_default()
    }

    /// Change a provider's limits at runtime
    pub fn set_quota_limit(&self, provider: &str, patch: &QuotaLimitPatch) -> QuotaLimit {
        let mut entry = self.limits.entry(provider.to_string()).or_default();
        entry.apply(patch);
        info!(
            provider = %provider,
            daily_limit = entry.daily_limit,
            monthly_limit = entry.monthly_limit,
            requests_per_minute = entry.requests_per_minute,
            enabled = entry.enabled,
            "Quota limit updated"
        );
        entry.value().clone()
    }

    // ------------------------------------------------------------------------
    // Cost
    // ------------------------------------------------------------------------

    /// Cost of a call at the model's per-1K prices
    #[must_use]
    pub fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        self.pricing
            .calculate_cost(provider, model, input_tokens, output_tokens)
    }

    /// Worst-case cost of `request` on `config`: prompt estimate plus the
    /// full output allowance
    #[must_use]
    pub fn estimate_cost(&self, config: &ProviderConfig, request: &CompletionRequest) -> f64 {
        let prompt_tokens = u32::try_from(count_message_tokens(&request.messages)).unwrap_or(u32::MAX);
        let max_tokens = resolve_max_tokens(config, request);
        let model = resolve_model(config, request);
        self.calculate_cost(&config.id, model, prompt_tokens, max_tokens)
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.clock.now_millis()).unwrap_or_default()
    }

    fn daily_key(provider: &str, now: DateTime<Utc>) -> String {
        format!("quota:{}:daily:{}", provider, now.format("%Y-%m-%d"))
    }

    fn monthly_key(provider: &str, now: DateTime<Utc>) -> String {
        format!("quota:{}:monthly:{}", provider, now.format("%Y-%m"))
    }

    async fn read_spend(&self, key: &str) -> Result<f64> {
        let value = self.store.get(key).await?;
        Ok(value.and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0))
    }

    async fn spend(&self, provider: &str) -> Result<(f64, f64)> {
        let now = self.now();
        let daily = self.read_spend(&Self::daily_key(provider, now)).await?;
        let monthly = self.read_spend(&Self::monthly_key(provider, now)).await?;
        Ok((daily, monthly))
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    /// Admit one request for `provider`
    ///
    /// Spend limits are checked first; the rate window is then evaluated and,
    /// on admission, already counts this attempt. Store failures admit the
    /// request unless the manager was built with `with_fail_open(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::QuotaExceeded`] when the estimate would cross the
    /// daily or monthly limit, [`ErrorKind::RateLimit`] when the window
    /// is full, and a non-retryable [`ErrorKind::ServiceUnavailable`] when
    /// the store fails and the manager does not fail open.
    pub async fn can_make_request(
        &self,
        provider: &str,
        estimated_cost: f64,
    ) -> std::result::Result<(), ProviderError> {
        let limit = self.limit(provider);
        if !limit.enabled {
            return Ok(());
        }

        match self.spend(provider).await {
            Ok((daily, monthly)) => {
                if daily + estimated_cost > limit.daily_limit {
                    return Err(ProviderError::new(
                        ErrorKind::QuotaExceeded,
                        provider,
                        format!(
                            "daily quota exceeded: {:.4} spent of {:.4}, request needs {:.4}",
                            daily, limit.daily_limit, estimated_cost
                        ),
                    ));
                }
                if monthly + estimated_cost > limit.monthly_limit {
                    return Err(ProviderError::new(
                        ErrorKind::QuotaExceeded,
                        provider,
                        format!(
                            "monthly quota exceeded: {:.4} spent of {:.4}, request needs {:.4}",
                            monthly, limit.monthly_limit, estimated_cost
                        ),
                    ));
                }
            }
            Err(e) => return self.store_failure(provider, &e),
        }

        let config = RateLimitConfig::new(limit.requests_per_minute, RATE_WINDOW);
        match self.limiter.check(provider, &config).await {
            Ok(result) if result.allowed => {
                self.store_recovered();
                debug!(provider = %provider, remaining = result.remaining, "Request admitted");
                Ok(())
            }
            Ok(result) => {
                self.store_recovered();
                let wait = result.reset_after(self.clock.now_millis());
                Err(ProviderError::new(
                    ErrorKind::RateLimit,
                    provider,
                    format!(
                        "request rate limit reached: {} per minute",
                        limit.requests_per_minute
                    ),
                )
                .with_retry_after(Some(wait)))
            }
            Err(e) => self.store_failure(provider, &e),
        }
    }

    /// Outcome of an admission whose store lookup failed
    ///
    /// Warns once per outage; later failures in the same outage log at debug.
    fn store_failure(
        &self,
        provider: &str,
        error: &dyn std::fmt::Display,
    ) -> std::result::Result<(), ProviderError> {
        if self.store_degraded.swap(true, Ordering::Relaxed) {
            debug!(provider = %provider, error = %error, fail_open = self.fail_open, "Coordination store still unavailable");
        } else {
            warn!(
                provider = %provider,
                error = %error,
                fail_open = self.fail_open,
                "Coordination store unavailable"
            );
        }
        if self.fail_open {
            Ok(())
        } else {
            Err(ProviderError::new(
                ErrorKind::ServiceUnavailable,
                provider,
                "quota store unavailable",
            )
            .with_retryable(false))
        }
    }

    fn store_recovered(&self) {
        if self.store_degraded.swap(false, Ordering::Relaxed) {
            info!("Coordination store reachable again, quota limits enforced");
        }
    }

    /// Count a retry attempt against the rate window without gating it
    pub async fn record_attempt(&self, provider: &str) {
        if let Err(e) = self.limiter.record(provider, RATE_WINDOW).await {
            warn!(provider = %provider, error = %e, "Failed to record attempt");
        }
    }

    // ------------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------------

    /// Account for a completed call and return its cost
    ///
    /// Only successful calls add spend and emit a [`CostRecord`].
    pub async fn record_usage(
        &self,
        provider: &str,
        model: &str,
        usage: TokenUsage,
        latency: Duration,
        success: bool,
    ) -> f64 {
        if !success {
            return 0.0;
        }

        let cost = self.calculate_cost(provider, model, usage.prompt_tokens, usage.completion_tokens);
        let now = self.now();

        if cost > 0.0 {
            let daily = self
                .store
                .incr_by_float(&Self::daily_key(provider, now), cost, DAILY_KEY_TTL)
                .await;
            let monthly = self
                .store
                .incr_by_float(&Self::monthly_key(provider, now), cost, MONTHLY_KEY_TTL)
                .await;
            match (daily, monthly) {
                (Ok(daily), Ok(monthly)) => {
                    debug!(provider = %provider, cost, daily, monthly, "Spend recorded");
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(provider = %provider, cost, error = %e, "Failed to record spend");
                }
            }
        }

        if let Some(sink) = &self.sink {
            sink.record_cost(&CostRecord {
                provider: provider.to_string(),
                model: model.to_string(),
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost,
                latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                success,
                timestamp: now,
            });
        }

        cost
    }

    /// Usage report for one provider
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable
    pub async fn quota_status_for(&self, provider: &str) -> Result<QuotaStatus> {
        let limit = self.limit(provider);
        let (daily_used, monthly_used) = self.spend(provider).await?;
        let requests_this_minute = self.limiter.current(provider, RATE_WINDOW).await?;

        Ok(QuotaStatus {
            provider: provider.to_string(),
            daily_used,
            daily_limit: limit.daily_limit,
            daily_remaining: (limit.daily_limit - daily_used).max(0.0),
            monthly_used,
            monthly_limit: limit.monthly_limit,
            monthly_remaining: (limit.monthly_limit - monthly_used).max(0.0),
            requests_this_minute,
            requests_per_minute: limit.requests_per_minute,
            enabled: limit.enabled,
            level: QuotaLevel::from_ratios(
                ratio(daily_used, limit.daily_limit),
                ratio(monthly_used, limit.monthly_limit),
            ),
        })
    }

    /// Usage report for every registered provider, sorted by id
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable
    pub async fn quota_status(&self) -> Result<Vec<QuotaStatus>> {
        let mut providers: Vec<String> = self.limits.iter().map(|e| e.key().clone()).collect();
        providers.sort();

        let mut out = Vec::with_capacity(providers.len());
        for provider in providers {
            out.push(self.quota_status_for(&provider).await?);
        }
        Ok(out)
    }
}
