//! External integrations module.
//!
//! The graph engine and chat layer talk to language models only through
//! [`ChatModel`]; [`OpenAIClient`] is the production implementation.

pub mod openai;

use futures::future::BoxFuture;

use crate::Result;

pub use openai::{ChatMessage, OpenAIClient};

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Prepended as a `system` message when not empty
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Chat-completion model: `complete(system, messages, temperature, max_tokens) -> text`.
pub trait ChatModel: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "chat-model"
    }
}
