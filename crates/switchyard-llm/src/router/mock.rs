//! Scripted executor for testing
//!
//! Replays queued outcomes per provider instead of calling the network.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{ErrorKind, ProviderError};
use crate::executor::{resolve_model, RequestExecutor};
use crate::registry::ProviderConfig;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Outcome = Result<CompletionResponse, ProviderError>;

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<Outcome>,
    repeat: Option<Outcome>,
    calls: u32,
}

/// An executor that returns queued outcomes per provider
///
/// Queued outcomes are consumed first, then the repeating outcome is used.
/// Providers with nothing scripted answer `"mock response"`.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    latency: Duration,
}

impl ScriptedExecutor {
    /// Create an executor with nothing scripted
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Script>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A successful completion with fixed usage
    #[must_use]
    pub fn response(content: impl Into<String>) -> CompletionResponse {
        CompletionResponse {
            content: content.into(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            },
            finish_reason: Some("stop".to_string()),
            model: "mock-model".to_string(),
        }
    }

    /// Queue a success
    pub fn push_ok(&self, provider: &str, content: impl Into<String>) {
        self.push(provider, Ok(Self::response(content)));
    }

    /// Queue a failure of `kind`
    pub fn push_err(&self, provider: &str, kind: ErrorKind) {
        self.push(provider, Err(ProviderError::new(kind, provider, "scripted failure")));
    }

    /// Queue an outcome
    pub fn push(&self, provider: &str, outcome: Outcome) {
        self.lock()
            .entry(provider.to_string())
            .or_default()
            .queued
            .push_back(outcome);
    }

    /// Succeed on every call once the queue is drained
    pub fn always_ok(&self, provider: &str, content: impl Into<String>) {
        self.lock().entry(provider.to_string()).or_default().repeat =
            Some(Ok(Self::response(content)));
    }

    /// Fail with `kind` on every call once the queue is drained
    pub fn always_err(&self, provider: &str, kind: ErrorKind) {
        self.lock().entry(provider.to_string()).or_default().repeat = Some(Err(
            ProviderError::new(kind, provider, "scripted failure"),
        ));
    }

    /// Calls made to `provider`
    #[must_use]
    pub fn calls(&self, provider: &str) -> u32 {
        self.lock().get(provider).map_or(0, |s| s.calls)
    }

    /// Calls made to every provider
    #[must_use]
    pub fn total_calls(&self) -> u32 {
        self.lock().values().map(|s| s.calls).sum()
    }

    fn next(&self, provider: &str) -> Option<Outcome> {
        let mut scripts = self.lock();
        let script = scripts.entry(provider.to_string()).or_default();
        script.calls += 1;
        script.queued.pop_front().or_else(|| script.repeat.clone())
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        provider: &ProviderConfig,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let outcome = self.next(&provider.id);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        outcome.unwrap_or_else(|| {
            let mut response = Self::response("mock response");
            response.model = resolve_model(provider, request).to_string();
            Ok(response)
        })
    }
}
