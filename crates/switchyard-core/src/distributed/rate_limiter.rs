//! Store-backed sliding window rate limiting
//!
//! The check-and-insert runs as one atomic store operation so concurrent
//! callers, in this process or others, can never overshoot the limit.

use crate::error::Result;
use crate::store::SharedStore;
use crate::utils::{system_clock, SharedClock};
use std::time::Duration;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Length of the rolling window
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

impl RateLimitConfig {
    /// Create a new rate limit config
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Create config for requests per minute
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// `now + window`, in Unix millis
    pub reset_at_ms: i64,
}

impl RateLimitResult {
    /// Time from `now_ms` until the window resets
    #[must_use]
    pub fn reset_after(&self, now_ms: i64) -> Duration {
        Duration::from_millis((self.reset_at_ms - now_ms).max(0) as u64)
    }
}

/// Sliding window limiter over a [`CoordinationStore`](crate::store::CoordinationStore)
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: SharedStore,
    clock: SharedClock,
    namespace: String,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("backend", &self.store.backend())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl SlidingWindowLimiter {
    /// Create a limiter storing its windows under `rate:`
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self::with_clock(store, system_clock())
    }

    /// Create a limiter reading time from `clock`
    #[must_use]
    pub fn with_clock(store: SharedStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            namespace: "rate:".to_string(),
        }
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}{}", self.namespace, identifier)
    }

    /// Admit and record one request for `identifier` if the window has room
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable
    pub async fn check(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult> {
        let now = self.clock.now_millis();
        let decision = self
            .store
            .sliding_window(&self.key(identifier), config.max_requests, config.window, now)
            .await?;

        debug!(
            identifier = %identifier,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Rate limit checked"
        );

        Ok(RateLimitResult {
            allowed: decision.allowed,
            remaining: decision.remaining,
            reset_at_ms: decision.reset_at_ms,
        })
    }

    /// Record a request without gating on the limit
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable
    pub async fn record(&self, identifier: &str, window: Duration) -> Result<()> {
        let now = self.clock.now_millis();
        self.store
            .window_record(&self.key(identifier), window, now)
            .await
    }

    /// Requests currently inside the window
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable
    pub async fn current(&self, identifier: &str, window: Duration) -> Result<u32> {
        let now = self.clock.now_millis();
        self.store
            .window_count(&self.key(identifier), window, now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::utils::{Clock, ManualClock};
    use std::sync::Arc;

    fn limiter() -> (SlidingWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        (SlidingWindowLimiter::with_clock(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_allows_exactly_limit_then_rejects() {
        let (limiter, clock) = limiter();
        let config = RateLimitConfig::per_minute(3);

        for expected in [2, 1, 0] {
            let result = limiter.check("user-1", &config).await.unwrap();
            assert!(result.allowed);
            assert_eq!(result.remaining, expected);
            clock.advance(1_000);
        }

        let fourth = limiter.check("user-1", &config).await.unwrap();
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.reset_after(clock.now_millis()), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let (limiter, _clock) = limiter();
        let config = RateLimitConfig::per_minute(1);

        assert!(limiter.check("a", &config).await.unwrap().allowed);
        assert!(!limiter.check("a", &config).await.unwrap().allowed);
        assert!(limiter.check("b", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_window_rolls_forward() {
        let (limiter, clock) = limiter();
        let config = RateLimitConfig::per_minute(2);

        assert!(limiter.check("k", &config).await.unwrap().allowed);
        clock.advance(30_000);
        assert!(limiter.check("k", &config).await.unwrap().allowed);
        clock.advance(29_999);
        assert!(!limiter.check("k", &config).await.unwrap().allowed);
        clock.advance(1);
        assert!(limiter.check("k", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_record_counts_without_gating() {
        let (limiter, _clock) = limiter();
        let window = Duration::from_secs(60);

        for _ in 0..5 {
            limiter.record("k", window).await.unwrap();
        }
        assert_eq!(limiter.current("k", window).await.unwrap(), 5);

        let config = RateLimitConfig::per_minute(5);
        assert!(!limiter.check("k", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_overshoot() {
        let (limiter, _clock) = limiter();
        let config = RateLimitConfig::per_minute(10);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("hot", &config).await.unwrap().allowed })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
