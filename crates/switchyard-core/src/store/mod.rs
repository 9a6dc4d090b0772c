//! Shared coordination store
//!
//! Hard limits that must hold across processes (spend ceilings, request
//! windows, locks) go through [`CoordinationStore`]. Every mutating
//! operation is a single atomic step on the backend; callers never compose
//! a get with a set.
//!
//! Backends:
//! - [`RedisStore`]: Lua scripts evaluated server-side
//! - [`MemoryStore`]: a mutex-guarded map for single-process deployments and tests

mod memory_store;
mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Default prefix applied to every key
pub const DEFAULT_KEY_PREFIX: &str = "switchyard:";

/// Outcome of a sliding-window admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowDecision {
    /// Whether the event was admitted (and recorded)
    pub allowed: bool,
    /// Events still available in the window after this one
    pub remaining: u32,
    /// `now + window`, in Unix millis
    pub reset_at_ms: i64,
}

/// Key-value store with the atomic operations coordination needs
///
/// Keys passed in are logical; backends prepend their configured prefix.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with an expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write a value with an expiry only if the key is absent
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Atomically add `delta` to a float counter and return the new value
    ///
    /// `ttl` is applied when the key has no expiry yet.
    async fn incr_by_float(&self, key: &str, delta: f64, ttl: Duration) -> Result<f64>;

    /// Atomic sliding-window check-and-insert
    ///
    /// Drops entries at or before `now - window`, counts the rest and
    /// inserts a new entry only when the count is below `limit`.
    async fn sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowDecision>;

    /// Insert an entry into a sliding window without checking the limit
    async fn window_record(&self, key: &str, window: Duration, now_ms: i64) -> Result<()>;

    /// Count live entries in a sliding window
    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32>;

    /// Delete `key` only if it currently holds `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Health check
    async fn ping(&self) -> Result<()>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn CoordinationStore>;

/// Unique member for a window entry
pub(crate) fn window_member(now_ms: i64) -> String {
    format!("{}:{}", now_ms, uuid::Uuid::new_v4().simple())
}
