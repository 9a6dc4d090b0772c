//! Switchyard Core - Resilience primitives
//!
//! Provider-agnostic building blocks for calling unreliable upstreams:
//! - Utils: Retry with backoff and jitter, circuit breaker, injectable clock
//! - Store: Shared coordination store (Redis or in-memory)
//! - Distributed: Sliding window rate limiting and distributed locks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod distributed;
pub mod error;
pub mod store;
pub mod utils;

pub use distributed::{
    DistributedLock, RateLimitConfig, RateLimitResult, SlidingWindowLimiter, LOCK_POLL_INTERVAL,
};
pub use error::{Error, Result};
pub use store::{
    CoordinationStore, MemoryStore, RedisStore, SharedStore, WindowDecision, DEFAULT_KEY_PREFIX,
};
pub use utils::{
    retry_with_backoff, system_clock, CircuitBreaker, CircuitBreakerConfig, CircuitOpen,
    CircuitPermit, CircuitSnapshot, CircuitState, Clock, FixedJitter, JitterSource, ManualClock,
    RandomJitter, RetryConfig, RetryError, Retryable, SharedClock, SystemClock,
};
