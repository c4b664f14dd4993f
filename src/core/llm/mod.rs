//! Text generation capability
//!
//! Defines the conversation message types, the [`Generator`] contract, and an
//! HTTP implementation for OpenAI-compatible chat-completions endpoints.

mod http;

pub use http::{HttpGenerator, LlmConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for generation operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Generation error types
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generation service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single generation request.
///
/// `context` is borrowed and never mutated by the generator; conversation
/// bookkeeping belongs to the caller. When `context` already starts with a
/// system entry it is used as-is, otherwise `system_prompt` is prepended.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// The user input for this turn
    pub input: &'a str,
    /// System prompt applied when the context has no leading system entry
    pub system_prompt: &'a str,
    /// Prior conversation context, oldest first
    pub context: &'a [ChatMessage],
    /// Sampling temperature override
    pub temperature: Option<f32>,
}

/// A completed generation
#[derive(Debug, Clone)]
pub struct Generation {
    /// Generated reply text
    pub text: String,
    /// Provider-specific metadata (model, token usage, ...)
    pub metadata: serde_json::Value,
}

/// Text generation collaborator contract
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> LlmResult<Generation>;
}
