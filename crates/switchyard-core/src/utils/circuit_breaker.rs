//! Circuit Breaker pattern implementation
//!
//! Per-upstream gate consulted before any attempt is made:
//! - Closed: requests pass through, failures are counted
//! - Open: every request is rejected until the cool-down elapses
//! - HalfOpen: exactly one probe request is let through
//!
//! A probe is owned through a [`CircuitPermit`]. Dropping a probe permit
//! without recording an outcome (e.g. the caller was cancelled) frees the
//! probe slot for the next caller.

use super::clock::{system_clock, SharedClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failures reached the threshold - requests are rejected
    Open,
    /// Testing recovery - a single probe passes through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is allowed
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set open-state cool-down
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Rejection returned while the circuit is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpen {
    /// Circuit name
    pub name: String,
    /// When the next probe will be admitted (Unix millis)
    pub next_probe_at: Option<i64>,
    /// Whether the rejection is due to another caller's in-flight probe
    pub probe_in_flight: bool,
}

impl std::fmt::Display for CircuitOpen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.probe_in_flight {
            write!(f, "circuit '{}' is half-open with a probe in flight", self.name)
        } else {
            write!(f, "circuit '{}' is open", self.name)
        }
    }
}

impl std::error::Error for CircuitOpen {}

/// Point-in-time view of a circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// When an open circuit admits its next probe
    pub next_probe_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    next_probe_at: Option<i64>,
    probe_in_flight: bool,
}

/// Circuit breaker for fault tolerance
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, system_clock())
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker reading time from `clock`
    #[must_use]
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                next_probe_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the stored state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Whether a request arriving now would be rejected
    #[must_use]
    pub fn is_open(&self) -> bool {
        let now = self.clock.now_millis();
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => inner.next_probe_at.is_none_or(|at| now < at),
            CircuitState::HalfOpen => inner.probe_in_flight,
        }
    }

    /// Ask to send a request through the circuit
    ///
    /// # Errors
    ///
    /// Returns [`CircuitOpen`] while the cool-down is running or while
    /// another caller holds the half-open probe.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CircuitOpen> {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(CircuitPermit {
                breaker: self,
                probe: false,
            }),
            CircuitState::Open => match inner.next_probe_at {
                Some(at) if now >= at => {
                    info!(name = %self.name, "Circuit breaker entering half-open state");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(CircuitPermit {
                        breaker: self,
                        probe: true,
                    })
                }
                next_probe_at => Err(CircuitOpen {
                    name: self.name.clone(),
                    next_probe_at,
                    probe_in_flight: false,
                }),
            },
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                debug!(name = %self.name, "Circuit breaker granting released probe");
                inner.probe_in_flight = true;
                Ok(CircuitPermit {
                    breaker: self,
                    probe: true,
                })
            }
            CircuitState::HalfOpen => Err(CircuitOpen {
                name: self.name.clone(),
                next_probe_at: inner.next_probe_at,
                probe_in_flight: true,
            }),
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(name = %self.name, "Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.next_probe_at = None;
        inner.probe_in_flight = false;
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                debug!(
                    name = %self.name,
                    failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        name = %self.name,
                        failures = inner.consecutive_failures,
                        cooldown_ms = self.config.cooldown.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                    self.open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    name = %self.name,
                    "Circuit breaker probe failed, reopening"
                );
                self.open(&mut inner, now);
            }
            CircuitState::Open => {
                // late result from a request admitted before the circuit opened
            }
        }
    }

    fn open(&self, inner: &mut Inner, now: i64) {
        inner.state = CircuitState::Open;
        inner.next_probe_at = Some(now + self.config.cooldown.as_millis() as i64);
        inner.probe_in_flight = false;
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight {
            debug!(name = %self.name, "Circuit breaker probe abandoned");
            inner.probe_in_flight = false;
        }
    }

    /// Current state, failure count and next probe time
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            next_probe_at: inner
                .next_probe_at
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.record_success();
    }
}

/// Admission through a [`CircuitBreaker`]
///
/// Outcomes are reported on the breaker itself; the permit only tracks
/// ownership of a half-open probe.
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
}

impl CircuitPermit<'_> {
    /// Whether this permit is the half-open probe
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.probe {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests;
