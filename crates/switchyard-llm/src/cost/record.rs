//! Cost records and aggregated usage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One completed call, as handed to the observability sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Provider id
    pub provider: String,
    /// Model that served the call
    pub model: String,
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
    /// Computed cost
    pub cost: f64,
    /// Latency in milliseconds
    pub latency_ms: u64,
    /// Was the call successful?
    pub success: bool,
    /// When the call completed
    pub timestamp: DateTime<Utc>,
}

impl CostRecord {
    /// Input plus output tokens
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

/// Aggregated usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    /// Total input tokens
    pub total_input_tokens: u64,
    /// Total output tokens
    pub total_output_tokens: u64,
    /// Total cost
    pub total_cost: f64,
    /// Total requests
    pub total_requests: u64,
    /// Failed requests
    pub failed_requests: u64,
    /// Average latency (ms)
    pub avg_latency_ms: f64,
    /// Usage by provider
    pub by_provider: HashMap<String, ProviderUsage>,
}

/// Per-provider usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Provider id
    pub provider: String,
    /// Request count
    pub requests: u64,
    /// Input tokens
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
    /// Total cost
    pub total_cost: f64,
    /// Average latency (ms)
    pub avg_latency_ms: f64,
    /// Fraction of failed requests
    pub error_rate: f64,
}

/// Cost efficiency of one provider; lower scores are better
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEfficiency {
    /// Provider id
    pub provider: String,
    /// Cost divided by tokens
    pub average_cost_per_token: f64,
    /// Average latency (ms)
    pub average_latency_ms: f64,
    /// Fraction of successful requests
    pub success_rate: f64,
    /// `cost_per_token * 1000 + latency_s + (1 - success_rate) * 10`
    pub score: f64,
}
