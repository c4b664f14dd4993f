//! HTTP generation client
//!
//! Talks to an OpenAI-compatible chat-completions endpoint
//! (`POST /v1/chat/completions`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{ChatMessage, Generation, GenerationRequest, Generator, LlmError, LlmResult, Role};

/// Default chat-completions endpoint (local inference server)
const DEFAULT_LLM_ENDPOINT: &str = "http://127.0.0.1:8001/v1/chat/completions";

/// Default model name
const DEFAULT_LLM_MODEL: &str = "local-model";

/// Default sampling temperature when a request carries no override
const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Generation client configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completions endpoint URL
    pub endpoint: String,
    /// Model name sent with each request
    pub model: String,
    /// Maximum tokens per reply
    pub max_tokens: Option<u32>,
    /// Temperature used when the request does not override it
    pub default_temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: None,
            default_temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// HTTP generator for OpenAI-compatible chat endpoints
pub struct HttpGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Assemble the wire-format message list for a request.
    ///
    /// The caller's context is copied, never mutated. A leading system entry
    /// in the context wins over the request's `system_prompt`.
    fn build_messages(request: &GenerationRequest<'_>) -> Vec<ChatMessage> {
        let mut messages =
            Vec::with_capacity(request.context.len() + 2);
        if request.context.first().map(|m| m.role) != Some(Role::System) {
            messages.push(ChatMessage::system(request.system_prompt));
        }
        messages.extend_from_slice(request.context);
        messages.push(ChatMessage::user(request.input));
        messages
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> LlmResult<Generation> {
        let messages = Self::build_messages(&request);
        let temperature = request
            .temperature
            .unwrap_or(self.config.default_temperature);

        debug!(
            model = %self.config.model,
            context_len = messages.len(),
            temperature,
            "sending generation request"
        );

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".to_string()))?;

        Ok(Generation {
            text,
            metadata: json!({
                "model": parsed.model,
                "usage": parsed.usage,
            }),
        })
    }
}
