//! Switchyard LLM - Resilient multi-provider chat completions
//!
//! This crate routes chat completion requests across OpenAI-style providers:
//! - Registry: Provider kinds, defaults and per-provider configuration
//! - Executor: One HTTP attempt with status classification
//! - Stats: Success rate and latency per provider, fallback ranking
//! - Quota: Daily/monthly spend ceilings and per-minute request windows
//! - Cost: Pricing, cost records and usage analysis
//! - Router: The orchestrator tying retries, circuits and quotas together

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod cost;
pub mod error;
pub mod executor;
pub mod message;
pub mod quota;
pub mod registry;
pub mod router;
pub mod sink;
pub mod stats;
pub mod token;
pub mod util;

pub use completion::{CompletionRequest, CompletionResponse, RoutedResponse, TokenUsage};
pub use cost::{
    default_pricing, CostRecord, CostTracker, ModelPricing, PricingTable, ProviderEfficiency,
    ProviderUsage, UsageStats,
};
pub use error::{Error, ErrorKind, ProviderError, Result};
pub use executor::{HttpExecutor, RequestExecutor};
pub use message::{Message, MessageRole};
pub use quota::{QuotaLevel, QuotaManager, QuotaStatus};
pub use registry::{
    ProviderConfig, ProviderKind, ProviderRegistry, QuotaLimit, QuotaLimitPatch,
};
pub use router::{CallOptions, Orchestrator, ProviderHealth, ScriptedExecutor};
pub use sink::{ChannelSink, MultiSink, ObservabilitySink, SharedSink, SinkEvent, TracingSink};
pub use stats::{ProviderStats, StatsRecorder};
pub use token::{count_message_tokens, TokenCounter};
