//! In-process coordination store
//!
//! Atomicity comes from a single mutex around all state. Limits enforced
//! through this store only hold within one process.

use super::{window_member, CoordinationStore, WindowDecision, DEFAULT_KEY_PREFIX};
use crate::error::{Error, Result};
use crate::utils::{system_clock, SharedClock};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Minimum spacing between sweeps of expired keys
const SWEEP_INTERVAL_MS: i64 = 60_000;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<i64>,
}

#[derive(Debug)]
struct Window {
    /// member -> score (Unix millis)
    entries: BTreeMap<String, i64>,
    expires_at: i64,
}

impl Window {
    fn prune(&mut self, cutoff: i64) {
        self.entries.retain(|_, score| *score > cutoff);
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    windows: HashMap<String, Window>,
    last_sweep: i64,
}

impl State {
    /// Drop every expired key; runs at most once per [`SWEEP_INTERVAL_MS`]
    fn sweep(&mut self, now: i64) {
        if now - self.last_sweep < SWEEP_INTERVAL_MS {
            return;
        }
        self.last_sweep = now;
        self.values
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        self.windows.retain(|_, w| w.expires_at > now);
    }

    fn live_value(&mut self, key: &str, now: i64) -> Option<&mut Entry> {
        let expired = self
            .values
            .get(key)
            .is_some_and(|e| e.expires_at.is_some_and(|at| at <= now));
        if expired {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }

    fn live_window(&mut self, key: &str, now: i64) -> Option<&mut Window> {
        if self.windows.get(key).is_some_and(|w| w.expires_at <= now) {
            self.windows.remove(key);
        }
        self.windows.get_mut(key)
    }
}

/// In-memory coordination store
#[derive(Debug)]
pub struct MemoryStore {
    prefix: String,
    clock: SharedClock,
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store on the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an empty store whose expiries follow `clock`
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            clock,
            state: Mutex::new(State::default()),
        }
    }

    /// Set key prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_millis() + ttl.as_millis() as i64
    }

    /// Number of keys held, including expired ones not yet swept
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        let state = self.lock();
        state.values.len() + state.windows.len()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now_millis();
        let mut state = self.lock();
        Ok(state
            .live_value(&self.build_key(key), now)
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(self.expiry(ttl)),
        };
        let mut state = self.lock();
        state.sweep(self.clock.now_millis());
        state.values.insert(self.build_key(key), entry);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let key = self.build_key(key);
        let mut state = self.lock();
        state.sweep(now);
        if state.live_value(&key, now).is_some() {
            return Ok(false);
        }
        state.values.insert(
            key,
            Entry {
                value: value.to_string(),
                expires_at: Some(self.expiry(ttl)),
            },
        );
        Ok(true)
    }

    async fn incr_by_float(&self, key: &str, delta: f64, ttl: Duration) -> Result<f64> {
        let now = self.clock.now_millis();
        let key = self.build_key(key);
        let mut state = self.lock();
        state.sweep(now);

        let (current, expires_at) = match state.live_value(&key, now) {
            Some(entry) => {
                let current: f64 = entry.value.parse().map_err(|e| {
                    Error::Serialization(format!("counter '{}' is not a float: {}", key, e))
                })?;
                (current, entry.expires_at)
            }
            None => (0.0, None),
        };

        let next = current + delta;
        state.values.insert(
            key,
            Entry {
                value: next.to_string(),
                expires_at: expires_at.or_else(|| Some(self.expiry(ttl))),
            },
        );
        Ok(next)
    }

    async fn sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowDecision> {
        let window_ms = window.as_millis() as i64;
        let reset_at_ms = now_ms + window_ms;
        let key = self.build_key(key);
        let mut state = self.lock();
        state.sweep(self.clock.now_millis());

        let current = match state.live_window(&key, self.clock.now_millis()) {
            Some(w) => {
                w.prune(now_ms - window_ms);
                w.entries.len() as u32
            }
            None => 0,
        };

        if current >= limit {
            return Ok(WindowDecision {
                allowed: false,
                remaining: 0,
                reset_at_ms,
            });
        }

        let w = state.windows.entry(key).or_insert_with(|| Window {
            entries: BTreeMap::new(),
            expires_at: reset_at_ms,
        });
        w.entries.insert(window_member(now_ms), now_ms);
        w.expires_at = self.expiry(window);

        Ok(WindowDecision {
            allowed: true,
            remaining: limit - current - 1,
            reset_at_ms,
        })
    }

    async fn window_record(&self, key: &str, window: Duration, now_ms: i64) -> Result<()> {
        let window_ms = window.as_millis() as i64;
        let key = self.build_key(key);
        let expires_at = self.expiry(window);
        let mut state = self.lock();
        state.sweep(self.clock.now_millis());

        let w = state.windows.entry(key).or_insert_with(|| Window {
            entries: BTreeMap::new(),
            expires_at,
        });
        w.prune(now_ms - window_ms);
        w.entries.insert(window_member(now_ms), now_ms);
        w.expires_at = expires_at;
        Ok(())
    }

    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32> {
        let window_ms = window.as_millis() as i64;
        let key = self.build_key(key);
        let mut state = self.lock();
        Ok(match state.live_window(&key, self.clock.now_millis()) {
            Some(w) => {
                w.prune(now_ms - window_ms);
                w.entries.len() as u32
            }
            None => 0,
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let key = self.build_key(key);
        let mut state = self.lock();
        let matches = state
            .live_value(&key, now)
            .is_some_and(|e| e.value == expected);
        if matches {
            state.values.remove(&key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = self.build_key(key);
        let mut state = self.lock();
        let removed_value = state.values.remove(&key).is_some();
        let removed_window = state.windows.remove(&key).is_some();
        Ok(removed_value || removed_window)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
