//! Cost Tracker - in-memory usage monitoring

use super::record::{CostRecord, ProviderEfficiency, ProviderUsage, UsageStats};
use crate::sink::ObservabilitySink;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Maximum records to keep in memory by default
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Keeps recent cost records and aggregates them on demand
#[derive(Debug)]
pub struct CostTracker {
    records: Mutex<VecDeque<CostRecord>>,
    max_records: usize,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    /// Create a new cost tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Create with custom max records
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CostRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a record, dropping the oldest beyond the limit
    pub fn push(&self, record: CostRecord) {
        let mut records = self.lock();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
    }

    /// Get recent records
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<CostRecord> {
        let records = self.lock();
        let start = records.len().saturating_sub(limit);
        records.iter().skip(start).cloned().collect()
    }

    fn since(&self, since: Option<DateTime<Utc>>) -> Vec<CostRecord> {
        self.lock()
            .iter()
            .filter(|r| since.is_none_or(|s| r.timestamp >= s))
            .cloned()
            .collect()
    }

    /// Get usage statistics for a time range
    #[must_use]
    pub fn get_stats(&self, since: Option<DateTime<Utc>>) -> UsageStats {
        let records = self.since(since);
        let mut stats = UsageStats::default();
        let mut latency: HashMap<String, u64> = HashMap::new();
        let mut failures: HashMap<String, u64> = HashMap::new();
        let mut total_latency = 0u64;

        for record in &records {
            stats.total_input_tokens += u64::from(record.input_tokens);
            stats.total_output_tokens += u64::from(record.output_tokens);
            stats.total_cost += record.cost;
            stats.total_requests += 1;
            total_latency += record.latency_ms;
            if !record.success {
                stats.failed_requests += 1;
                *failures.entry(record.provider.clone()).or_default() += 1;
            }

            let usage = stats
                .by_provider
                .entry(record.provider.clone())
                .or_insert_with(|| ProviderUsage {
                    provider: record.provider.clone(),
                    ..Default::default()
                });
            usage.requests += 1;
            usage.input_tokens += u64::from(record.input_tokens);
            usage.output_tokens += u64::from(record.output_tokens);
            usage.total_cost += record.cost;
            *latency.entry(record.provider.clone()).or_default() += record.latency_ms;
        }

        for (provider, usage) in &mut stats.by_provider {
            let requests = usage.requests.max(1) as f64;
            usage.avg_latency_ms = latency.get(provider).copied().unwrap_or(0) as f64 / requests;
            usage.error_rate = failures.get(provider).copied().unwrap_or(0) as f64 / requests;
        }
        if !records.is_empty() {
            stats.avg_latency_ms = total_latency as f64 / records.len() as f64;
        }

        stats
    }

    /// Rank providers by cost efficiency, best first
    #[must_use]
    pub fn analyze_efficiency(&self, since: Option<DateTime<Utc>>) -> Vec<ProviderEfficiency> {
        let stats = self.get_stats(since);
        let mut ranked: Vec<ProviderEfficiency> = stats
            .by_provider
            .into_values()
            .map(|usage| {
                let tokens = (usage.input_tokens + usage.output_tokens).max(1) as f64;
                let average_cost_per_token = usage.total_cost / tokens;
                let success_rate = 1.0 - usage.error_rate;
                let score = average_cost_per_token * 1000.0
                    + usage.avg_latency_ms / 1000.0
                    + (1.0 - success_rate) * 10.0;
                ProviderEfficiency {
                    provider: usage.provider,
                    average_cost_per_token,
                    average_latency_ms: usage.avg_latency_ms,
                    success_rate,
                    score,
                }
            })
            .collect();

        ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
        ranked
    }
}

impl ObservabilitySink for CostTracker {
    fn record_cost(&self, record: &CostRecord) {
        self.push(record.clone());
    }
}
