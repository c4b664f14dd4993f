//! HTTP synthesis client
//!
//! Talks to an OpenAI-compatible speech endpoint
//! (`POST /v1/audio/speech/stream`, JSON body, WAV byte-stream response).

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{AudioStream, Synthesizer, TtsError, TtsResult};

/// Default speech endpoint (local TTS server)
const DEFAULT_TTS_ENDPOINT: &str = "http://127.0.0.1:8002/v1/audio/speech/stream";

/// Default TTS model
const DEFAULT_TTS_MODEL: &str = "tts-1";

/// Default voice
const DEFAULT_TTS_VOICE: &str = "tara";

/// Default speech speed multiplier
const DEFAULT_TTS_SPEED: f32 = 1.0;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Synthesis client configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Speech endpoint URL
    pub endpoint: String,
    /// Model name sent with each request
    pub model: String,
    /// Voice to synthesize with
    pub voice: String,
    /// Speech speed multiplier (0.25 to 4.0)
    pub speed: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_TTS_VOICE.to_string(),
            speed: DEFAULT_TTS_SPEED,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// HTTP synthesizer for OpenAI-compatible speech endpoints
pub struct HttpSynthesizer {
    config: TtsConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(config: TtsConfig) -> TtsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> TtsResult<AudioStream> {
        debug!(chars = text.len(), voice = %self.config.voice, "sending synthesis request");

        let body = json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
            "response_format": "wav",
            "speed": self.config.speed.clamp(0.25, 4.0),
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Service {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(response.bytes_stream().map_err(TtsError::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> TtsConfig {
        TtsConfig {
            endpoint: format!("{}/v1/audio/speech/stream", server.uri()),
            voice: "tara".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_synthesize_streams_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech/stream"))
            .and(body_partial_json(serde_json::json!({
                "input": "hello",
                "voice": "tara",
                "response_format": "wav"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 100]))
            .mount(&server)
            .await;

        let synthesizer = HttpSynthesizer::new(test_config(&server)).unwrap();
        let mut stream = synthesizer.synthesize("hello").await.unwrap();

        let mut collected = Vec::new();
        while let Some(block) = stream.next().await {
            collected.extend_from_slice(&block.unwrap());
        }
        assert_eq!(collected, vec![7u8; 100]);
    }

    #[tokio::test]
    async fn test_service_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech/stream"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let synthesizer = HttpSynthesizer::new(test_config(&server)).unwrap();
        let result = synthesizer.synthesize("hello").await;
        assert!(matches!(result, Err(TtsError::Service { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_out_of_range_speed_clamped_in_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech/stream"))
            .and(body_partial_json(serde_json::json!({ "speed": 4.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
            .expect(1)
            .mount(&server)
            .await;

        let config = TtsConfig {
            speed: 9.5,
            ..test_config(&server)
        };
        let synthesizer = HttpSynthesizer::new(config).unwrap();
        synthesizer.synthesize("hello").await.unwrap();
    }
}
