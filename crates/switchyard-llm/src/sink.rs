//! Observability sinks
//!
//! Cost records and health snapshots leave the router through an
//! [`ObservabilitySink`]. Sinks are fire-and-forget: methods are synchronous
//! and must not block, so the request path never waits on persistence.

use crate::cost::CostRecord;
use crate::router::ProviderHealth;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receiver of cost records and health snapshots
#[cfg_attr(test, mockall::automock)]
pub trait ObservabilitySink: Send + Sync {
    /// A completed, billed call
    fn record_cost(&self, record: &CostRecord);

    /// Per-provider health, pushed on demand
    fn record_health(&self, _snapshot: &[ProviderHealth]) {}
}

/// Shared sink handle
pub type SharedSink = Arc<dyn ObservabilitySink>;

/// Writes records to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record_cost(&self, record: &CostRecord) {
        info!(
            provider = %record.provider,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost = record.cost,
            latency_ms = record.latency_ms,
            "Usage recorded"
        );
    }

    fn record_health(&self, snapshot: &[ProviderHealth]) {
        for health in snapshot {
            debug!(
                provider = %health.provider,
                enabled = health.enabled,
                circuit = %health.circuit.state,
                success_rate = health.stats.success_rate(),
                "Provider health"
            );
        }
    }
}

/// Event forwarded by [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// A cost record
    Cost(CostRecord),
    /// A health snapshot
    Health(Vec<ProviderHealth>),
}

/// Forwards records to an unbounded channel for an external consumer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ObservabilitySink for ChannelSink {
    fn record_cost(&self, record: &CostRecord) {
        if self.tx.send(SinkEvent::Cost(record.clone())).is_err() {
            debug!("Sink receiver dropped, cost record discarded");
        }
    }

    fn record_health(&self, snapshot: &[ProviderHealth]) {
        if self.tx.send(SinkEvent::Health(snapshot.to_vec())).is_err() {
            debug!("Sink receiver dropped, health snapshot discarded");
        }
    }
}

/// Fans records out to several sinks
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<SharedSink>,
}

impl MultiSink {
    /// Create from a list of sinks
    #[must_use]
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

impl ObservabilitySink for MultiSink {
    fn record_cost(&self, record: &CostRecord) {
        for sink in &self.sinks {
            sink.record_cost(record);
        }
    }

    fn record_health(&self, snapshot: &[ProviderHealth]) {
        for sink in &self.sinks {
            sink.record_health(snapshot);
        }
    }
}
