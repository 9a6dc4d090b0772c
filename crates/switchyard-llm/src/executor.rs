//! Request Executor
//!
//! One network attempt against one provider. The executor never retries;
//! it turns every transport or HTTP outcome into a [`CompletionResponse`] or
//! a classified [`ProviderError`].

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, ErrorKind, ProviderError, Result};
use crate::message::Message;
use crate::registry::ProviderConfig;
use crate::util::{sanitize_error_for_user, truncate_body};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("switchyard/", env!("CARGO_PKG_VERSION"));

/// Longest upstream body quoted in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Performs a single attempt against a provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Send `request` to `provider` once
    async fn execute(
        &self,
        provider: &ProviderConfig,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;
}

/// Wire payload of an OpenAI-style chat completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest<'a> {
    /// Model
    pub model: &'a str,
    /// Conversation
    pub messages: &'a [Message],
    /// Temperature
    pub temperature: f32,
    /// Output token ceiling
    pub max_tokens: u32,
    /// Always false; streaming is not supported
    pub stream: bool,
    /// Nucleus sampling, for providers that expect it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Model a request will run on
#[must_use]
pub fn resolve_model<'a>(provider: &'a ProviderConfig, request: &'a CompletionRequest) -> &'a str {
    request
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(&provider.model)
}

/// Output token ceiling a request will run with
#[must_use]
pub fn resolve_max_tokens(provider: &ProviderConfig, request: &CompletionRequest) -> u32 {
    request
        .max_tokens
        .filter(|n| *n > 0)
        .unwrap_or(provider.max_tokens)
}

/// Build the wire payload, filling unset fields from the provider defaults
#[must_use]
pub fn build_payload<'a>(
    provider: &'a ProviderConfig,
    request: &'a CompletionRequest,
) -> ChatRequest<'a> {
    ChatRequest {
        model: resolve_model(provider, request),
        messages: &request.messages,
        temperature: request.temperature.unwrap_or(provider.temperature),
        max_tokens: resolve_max_tokens(provider, request),
        stream: false,
        top_p: provider.kind.top_p(),
    }
}

/// Map an unsuccessful HTTP status to a provider error
#[must_use]
pub fn classify_status(
    provider: &str,
    status: StatusCode,
    headers: &HeaderMap,
    message: String,
) -> ProviderError {
    let kind = match status.as_u16() {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimit,
        400 => ErrorKind::InvalidRequest,
        402 => ErrorKind::QuotaExceeded,
        503 => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Unknown,
    };

    let retry_after = if kind == ErrorKind::RateLimit {
        parse_retry_after(headers)
    } else {
        None
    };

    ProviderError::new(kind, provider, message)
        .with_status(status.as_u16())
        .with_retry_after(retry_after)
}

/// Parse `Retry-After` as delay-seconds or an HTTP date
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Pull a human-readable message out of an error body
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    let raw = match from_json {
        Some(msg) => msg,
        None if !body.trim().is_empty() => truncate_body(body.trim(), MAX_ERROR_BODY_CHARS),
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    sanitize_error_for_user(&raw)
}

fn transport_error(provider: &str, err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::new(ErrorKind::Timeout, provider, "request timeout")
    } else if err.is_decode() {
        ProviderError::new(
            ErrorKind::Parse,
            provider,
            format!("failed to read response: {}", err),
        )
    } else {
        ProviderError::new(
            ErrorKind::Network,
            provider,
            sanitize_error_for_user(&format!("network error: {}", err)),
        )
    }
}

/// Parse a successful response body
///
/// # Errors
///
/// Returns a retryable [`ErrorKind::Parse`] error for malformed bodies or a
/// response without choices
pub fn parse_response(
    provider: &str,
    requested_model: &str,
    body: &str,
) -> std::result::Result<CompletionResponse, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(
            ErrorKind::Parse,
            provider,
            format!("failed to parse response: {}", e),
        )
    })?;

    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        ProviderError::new(ErrorKind::Parse, provider, "no choices in response")
    })?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: if u.total_tokens > 0 {
                u.total_tokens
            } else {
                u.prompt_tokens.saturating_add(u.completion_tokens)
            },
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.and_then(|m| m.content).unwrap_or_default(),
        usage,
        finish_reason: choice.finish_reason,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
    })
}

/// HTTP executor for OpenAI-style chat completion endpoints
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// Create an executor with a fresh connection pool
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use an existing client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    #[instrument(skip(self, provider, request), fields(provider = %provider.id, model))]
    async fn execute(
        &self,
        provider: &ProviderConfig,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let payload = build_payload(provider, request);
        tracing::Span::current().record("model", payload.model);
        debug!(endpoint = %provider.endpoint(), "Sending chat completion");

        let mut builder = self
            .client
            .post(provider.endpoint())
            .timeout(provider.timeout)
            .bearer_auth(&provider.api_key)
            .json(&payload);
        for (name, value) in provider.kind.extra_headers() {
            builder = builder.header(*name, *value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&provider.id, &e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&provider.id, &e))?;

        if !status.is_success() {
            let message = error_message(status, &body);
            let err = classify_status(&provider.id, status, &headers, message);
            debug!(status = status.as_u16(), kind = %err.kind, "Provider returned error status");
            return Err(err);
        }

        parse_response(&provider.id, payload.model, &body)
    }
}
