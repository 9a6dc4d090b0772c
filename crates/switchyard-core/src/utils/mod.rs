//! Utility modules for switchyard-core
//!
//! Provides common utilities:
//! - clock: Injectable wall clock
//! - retry: Retry logic with exponential backoff and jitter
//! - circuit_breaker: Circuit breaker pattern for fault tolerance

mod circuit_breaker;
mod clock;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitPermit, CircuitSnapshot,
    CircuitState,
};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use retry::{
    retry_with_backoff, FixedJitter, JitterSource, RandomJitter, RetryConfig, RetryError,
    Retryable, JITTER_MIN_FACTOR,
};
