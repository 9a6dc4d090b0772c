//! Per-provider call statistics and fallback ranking
//!
//! Statistics are observational: they never gate a request, they only decide
//! the order in which candidates are tried.

use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;
use switchyard_core::{system_clock, SharedClock};

/// Counters and latency for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    /// Attempts made
    pub total_requests: u64,
    /// Successful attempts
    pub successful_requests: u64,
    /// Failed attempts
    pub failed_requests: u64,
    /// Smoothed latency, `avg = (avg + sample) / 2`
    pub avg_latency_ms: f64,
    /// Time of the last success
    pub last_success: Option<DateTime<Utc>>,
    /// Most recent failure
    pub last_error: Option<ProviderError>,
}

impl ProviderStats {
    /// Fraction of successful attempts; 0 when nothing was attempted
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    fn observe_latency(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.avg_latency_ms = if self.total_requests <= 1 {
            sample
        } else {
            (self.avg_latency_ms + sample) / 2.0
        };
    }
}

/// Thread-safe table of [`ProviderStats`] keyed by provider id
#[derive(Debug)]
pub struct StatsRecorder {
    stats: DashMap<String, ProviderStats>,
    clock: SharedClock,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a recorder stamping successes with `clock`
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            stats: DashMap::new(),
            clock,
        }
    }

    /// Record a successful attempt
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let now = DateTime::<Utc>::from_timestamp_millis(self.clock.now_millis());
        let mut entry = self.stats.entry(provider.to_string()).or_default();
        entry.total_requests += 1;
        entry.successful_requests += 1;
        entry.observe_latency(latency);
        entry.last_success = now;
    }

    /// Record a failed attempt
    pub fn record_failure(&self, provider: &str, latency: Duration, error: &ProviderError) {
        let mut entry = self.stats.entry(provider.to_string()).or_default();
        entry.total_requests += 1;
        entry.failed_requests += 1;
        entry.observe_latency(latency);
        entry.last_error = Some(error.clone());
    }

    /// Replace a provider's statistics
    pub fn insert(&self, provider: impl Into<String>, stats: ProviderStats) {
        self.stats.insert(provider.into(), stats);
    }

    /// Statistics of one provider
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<ProviderStats> {
        self.stats.get(provider).map(|s| s.value().clone())
    }

    /// Copy of every provider's statistics
    #[must_use]
    pub fn all(&self) -> HashMap<String, ProviderStats> {
        self.stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Order candidates for fallback
    ///
    /// Success rate descending, then average latency ascending. Providers
    /// without statistics rank as rate 0. An eligible `preferred` provider is
    /// moved to the front; the sort is stable otherwise.
    #[must_use]
    pub fn rank(&self, candidates: &[String], preferred: Option<&str>) -> Vec<String> {
        let mut scored: Vec<(String, f64, f64)> = candidates
            .iter()
            .map(|id| {
                let (rate, latency) = self
                    .stats
                    .get(id)
                    .map_or((0.0, 0.0), |s| (s.success_rate(), s.avg_latency_ms));
                (id.clone(), rate, latency)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
        });

        let mut ranked: Vec<String> = scored.into_iter().map(|(id, _, _)| id).collect();
        if let Some(pos) = preferred.and_then(|p| ranked.iter().position(|id| id == p)) {
            let id = ranked.remove(pos);
            ranked.insert(0, id);
        }
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use switchyard_core::ManualClock;

    fn stats(success: u64, total: u64, latency: f64) -> ProviderStats {
        ProviderStats {
            total_requests: total,
            successful_requests: success,
            failed_requests: total - success,
            avg_latency_ms: latency,
            ..Default::default()
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_success_rate_of_nothing_is_zero() {
        assert_eq!(ProviderStats::default().success_rate(), 0.0);
    }

    #[test]
    fn test_recording() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let recorder = StatsRecorder::with_clock(clock);

        recorder.record_success("a", Duration::from_millis(100));
        recorder.record_success("a", Duration::from_millis(300));
        let err = ProviderError::new(ErrorKind::Timeout, "a", "request timeout");
        recorder.record_failure("a", Duration::from_millis(500), &err);

        let a = recorder.get("a").unwrap();
        assert_eq!(a.total_requests, 3);
        assert_eq!(a.successful_requests, 2);
        assert_eq!(a.failed_requests, 1);
        // 100, then (100+300)/2 = 200, then (200+500)/2 = 350
        assert!((a.avg_latency_ms - 350.0).abs() < 1e-9);
        assert_eq!(a.last_error, Some(err));
        assert_eq!(
            a.last_success.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert!((a.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert!(recorder.get("b").is_none());
    }

    #[test]
    fn test_rank_rate_then_latency() {
        let recorder = StatsRecorder::new();
        recorder.insert("a", stats(95, 100, 800.0));
        recorder.insert("b", stats(95, 100, 400.0));
        recorder.insert("c", stats(99, 100, 5000.0));

        let ranked = recorder.rank(&ids(&["a", "b", "c"]), None);
        assert_eq!(ranked, ids(&["c", "b", "a"]));
    }

    #[test]
    fn test_rank_unknown_providers_last() {
        let recorder = StatsRecorder::new();
        recorder.insert("a", stats(1, 2, 100.0));

        let ranked = recorder.rank(&ids(&["new", "a"]), None);
        assert_eq!(ranked, ids(&["a", "new"]));
    }

    #[test]
    fn test_rank_preferred_first() {
        let recorder = StatsRecorder::new();
        recorder.insert("a", stats(99, 100, 100.0));
        recorder.insert("b", stats(10, 100, 900.0));

        let ranked = recorder.rank(&ids(&["a", "b"]), Some("b"));
        assert_eq!(ranked, ids(&["b", "a"]));

        // Preferred but not a candidate
        let ranked = recorder.rank(&ids(&["a", "b"]), Some("ghost"));
        assert_eq!(ranked, ids(&["a", "b"]));
    }
}
