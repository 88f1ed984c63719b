//! Completion service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Usage;
use crate::error::Result;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// The asking party.
    User,
    /// A previous model turn.
    Assistant,
}

/// A role-tagged message sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// The message body.
    pub text: String,
}

impl Message {
    /// A `user` message.
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    /// A `system` message.
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into() }
    }
}

/// Shape of the completion output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// A JSON object.
    Structured,
}

/// Sampling configuration for one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Requested output shape.
    pub response_format: ResponseFormat,
}

impl CompletionOptions {
    /// Text output with the given temperature and budget.
    pub fn text(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature, max_tokens, response_format: ResponseFormat::Text }
    }
}

/// The service's reply to one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Alternative completions, best first.
    pub alternatives: Vec<String>,
    /// Token usage, when the service reports it.
    pub usage: Option<Usage>,
}

/// A text-generation backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the given messages.
    async fn complete(&self, messages: &[Message], options: &CompletionOptions)
    -> Result<Completion>;

    /// The model identifier used for generation.
    fn model_name(&self) -> &str;
}
