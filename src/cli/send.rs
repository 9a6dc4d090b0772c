//! CLI command: `switchyard send`
//!
//! Routes one prompt through the fallback chain. Ctrl+C cancels the request.

use crate::app::App;
use clap::Args;
use switchyard_llm::{CompletionRequest, Message};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Arguments of `send`
#[derive(Args, Debug)]
pub struct SendArgs {
    /// User prompt
    pub prompt: String,
    /// System prompt
    #[arg(long)]
    pub system: Option<String>,
    /// Provider to try first
    #[arg(long)]
    pub provider: Option<String>,
    /// Model override
    #[arg(long)]
    pub model: Option<String>,
    /// Temperature override
    #[arg(long)]
    pub temperature: Option<f32>,
    /// Output token ceiling
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

impl SendArgs {
    /// Build the completion request
    pub fn to_request(&self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.prompt.clone()));

        let mut request = CompletionRequest::new(messages);
        request.model = self.model.clone();
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }
}

/// Run the send subcommand.
pub async fn run(app: &App, args: SendArgs) -> anyhow::Result<()> {
    let request = args.to_request();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            on_signal.cancel();
        }
    });

    let result = app
        .orchestrator
        .send_with_fallback_cancellable(&request, args.provider.as_deref(), &cancel)
        .await;
    watcher.abort();
    let routed = result?;

    println!("{}", routed.response.content);
    println!();
    let cost = app
        .costs
        .recent(1)
        .first()
        .map_or(0.0, |record| record.cost);
    println!(
        "  [{} / {}] tokens {} in, {} out  |  cost ${:.4}",
        routed.used_provider,
        routed.response.model,
        routed.response.usage.prompt_tokens,
        routed.response.usage.completion_tokens,
        cost
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_llm::MessageRole;

    #[test]
    fn test_request_from_args() {
        let args = SendArgs {
            prompt: "hi".to_string(),
            system: Some("be brief".to_string()),
            provider: None,
            model: Some("glm-4".to_string()),
            temperature: None,
            max_tokens: Some(32),
        };
        let request = args.to_request();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1].content, "hi");
        assert_eq!(request.model.as_deref(), Some("glm-4"));
        assert_eq!(request.max_tokens, Some(32));
        assert!(request.temperature.is_none());
    }
}
