//! Token estimation
//!
//! Uses tiktoken's cl100k_base encoding as a provider-neutral approximation.
//! Estimates only feed admission cost checks; billing uses the usage the
//! provider reports.

use crate::message::Message;
use std::sync::LazyLock;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

/// Role marker and separators per message
const MESSAGE_OVERHEAD: usize = 6;
/// Start/end tokens per conversation
const CONVERSATION_OVERHEAD: usize = 3;

static TOKENIZER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!(error = %e, "cl100k_base unavailable, falling back to character estimate");
        None
    }
});

/// Token counter for estimating prompt size
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    /// Create a new token counter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Count tokens in a string
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        match TOKENIZER.as_ref() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            // roughly four characters per token
            None => text.chars().count().div_ceil(4),
        }
    }

    /// Count tokens in a message (includes role overhead)
    #[must_use]
    pub fn count_message_tokens(&self, message: &Message) -> usize {
        self.count_tokens(&message.content) + MESSAGE_OVERHEAD
    }

    /// Count total tokens in a conversation
    #[must_use]
    pub fn count_conversation_tokens(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.count_message_tokens(m))
            .sum::<usize>()
            + CONVERSATION_OVERHEAD
    }
}

/// Convenience function to count tokens in messages
#[must_use]
pub fn count_message_tokens(messages: &[Message]) -> usize {
    TokenCounter::new().count_conversation_tokens(messages)
}
