//! Error types for switchyard-llm
//!
//! Upstream failures form a closed taxonomy ([`ErrorKind`]). Each
//! [`ProviderError`] carries the data the retry loop and the router act on
//! (`retryable`, `retry_after`) instead of relying on the error's type.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_core::{CircuitOpen, Retryable};
use thiserror::Error;

/// Category of an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection could not be established or was reset
    Network,
    /// Upstream throttled the request (HTTP 429) or local window is full
    RateLimit,
    /// Credentials rejected (HTTP 401/403)
    Auth,
    /// Spend ceiling reached, upstream (HTTP 402) or local
    QuotaExceeded,
    /// Request rejected as malformed (HTTP 400)
    InvalidRequest,
    /// Upstream unavailable (HTTP 503) or circuit open
    ServiceUnavailable,
    /// Attempt exceeded its deadline or was cancelled
    Timeout,
    /// Response body could not be decoded
    Parse,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::QuotaExceeded => "quota_exceeded",
            Self::InvalidRequest => "invalid_request",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::Parse => "parse",
            Self::Unknown => "unknown",
        }
    }

    /// Whether errors of this kind are retried unless stated otherwise
    #[must_use]
    pub fn default_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Auth | Self::QuotaExceeded | Self::InvalidRequest
        )
    }

    /// Kinds that only say something about one provider, not the request
    #[must_use]
    pub fn is_provider_specific(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::QuotaExceeded | Self::InvalidRequest
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt against one provider
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{provider}: {kind}: {message}")]
pub struct ProviderError {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
    /// Provider id
    pub provider: String,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Whether another attempt may succeed
    pub retryable: bool,
    /// Delay requested by the upstream
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Create an error with the kind's default retryability
    #[must_use]
    pub fn new(kind: ErrorKind, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: provider.into(),
            status: None,
            retryable: kind.default_retryable(),
            retry_after: None,
        }
    }

    /// Set HTTP status
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Override retryability
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Set retry hint
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Rejection synthesized for an open circuit
    #[must_use]
    pub fn circuit_open(open: &CircuitOpen) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, &open.name, open.to_string()).with_retryable(false)
    }

    /// The caller gave up on the request
    #[must_use]
    pub fn cancelled(provider: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, provider, "request cancelled").with_retryable(false)
    }

    /// No provider could be tried at all
    #[must_use]
    pub fn no_providers(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, "router", message).with_retryable(false)
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Error type for setup and administrative operations
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Invalid provider or quota configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Coordination store failure
    #[error(transparent)]
    Store(#[from] switchyard_core::Error),

    /// Upstream failure
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
