//! Cross-process coordination primitives
//!
//! - rate_limiter: Atomic sliding window admission
//! - lock: Token-guarded mutual exclusion with bounded polling

mod lock;
mod rate_limiter;

pub use lock::{DistributedLock, LOCK_POLL_INTERVAL};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, SlidingWindowLimiter};
