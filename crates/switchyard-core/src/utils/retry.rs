//! Retry logic with exponential backoff
//!
//! Bounded retry loop with optional exponential growth, jitter drawn from an
//! injected [`JitterSource`], and server-supplied `retry_after` hints that
//! override the computed delay.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Lower bound of the jitter scaling factor
pub const JITTER_MIN_FACTOR: f64 = 0.5;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    /// Whether the failed operation may be attempted again
    fn is_retryable(&self) -> bool;

    /// Delay requested by the remote side before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Source of the random factor used to spread retry delays
pub trait JitterSource: Send + Sync {
    /// A factor in `[0.5, 1.0]`
    fn factor(&self) -> f64;
}

/// Uniformly distributed jitter from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn factor(&self) -> f64 {
        rand::thread_rng().gen_range(JITTER_MIN_FACTOR..=1.0)
    }
}

/// Constant jitter factor, clamped to `[0.5, 1.0]`
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn factor(&self) -> f64 {
        self.0.clamp(JITTER_MIN_FACTOR, 1.0)
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "duration_ms", rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Double the delay after each failed attempt
    pub exponential_backoff: bool,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            exponential_backoff: true,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable exponential backoff
    #[must_use]
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Attempts actually made; zero is treated as one.
    #[must_use]
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter
    #[must_use]
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = if self.exponential_backoff {
            base_ms * 2f64.powi(attempt.saturating_sub(1).min(62) as i32)
        } else {
            base_ms
        };
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay to wait after failed attempt `attempt`
    ///
    /// A `retry_after` hint wins over the computed backoff but is still
    /// capped by `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(
        &self,
        attempt: u32,
        retry_after: Option<Duration>,
        jitter: &dyn JitterSource,
    ) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }

        let delay = self.base_delay_for_attempt(attempt);
        if self.jitter {
            delay.mul_f64(jitter.factor().clamp(JITTER_MIN_FACTOR, 1.0))
        } else {
            delay
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Error type for retry operations
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error encountered, unchanged
    pub last_error: E,
    /// Total number of attempts made
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Execute an async operation with retry logic
///
/// `operation` receives the 1-based attempt number. A failure stops the loop
/// when the error is not [`Retryable::is_retryable`], when `can_continue`
/// vetoes another attempt (e.g. a circuit that just opened), or when the
/// attempt budget is spent. The last error is returned unchanged.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::default();
/// let result = retry_with_backoff(
///     &config,
///     &RandomJitter,
///     |attempt| async move { call_upstream(attempt).await },
///     |_err| true,
/// ).await;
/// ```
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    config: &RetryConfig,
    jitter: &dyn JitterSource,
    mut operation: F,
    can_continue: C,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Retryable + std::fmt::Debug,
{
    let max_attempts = config.effective_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let should_retry =
                    attempt < max_attempts && e.is_retryable() && can_continue(&e);

                if !should_retry {
                    debug!(
                        attempt = attempt,
                        retryable = e.is_retryable(),
                        error = ?e,
                        "Operation failed, no more retries"
                    );
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    });
                }

                let delay = config.delay_for_attempt(attempt, e.retry_after(), jitter);
                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
