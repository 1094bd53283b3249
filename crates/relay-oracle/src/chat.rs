//! The chat-completion seam the dialogue engine is written against.

use async_trait::async_trait;
use relay_types::ChatMessage;

use crate::error::OracleError;

/// A single chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System instruction placed ahead of `messages`.
    pub system: Option<String>,
    /// Conversation replayed to the model, in order.
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Overrides the client's configured chat model.
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            system: None,
            messages,
            temperature: None,
            max_tokens: None,
            model: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated text of every message, in order. Handy for fakes and logs.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A fallible request/response call to a hosted language model.
///
/// Implementations do not retry; a single call either yields the model's
/// text or an [`OracleError`].
#[async_trait]
pub trait ChatOracle: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, OracleError>;
}
