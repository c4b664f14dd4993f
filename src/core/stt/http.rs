//! HTTP transcription client
//!
//! Talks to a Whisper-compatible REST endpoint
//! (`POST /v1/audio/transcriptions`, multipart form with a `file` part and a
//! `model` field, JSON response with a `text` field).

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{SttError, SttResult, Transcriber, Transcript};

/// Default transcription endpoint (local Whisper server)
const DEFAULT_STT_ENDPOINT: &str = "http://127.0.0.1:8000/v1/audio/transcriptions";

/// Default transcription model
const DEFAULT_STT_MODEL: &str = "whisper-1";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Transcription client configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Transcription endpoint URL
    pub endpoint: String,
    /// Model name sent with each request
    pub model: String,
    /// Optional language hint (ISO 639-1)
    pub language: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_STT_ENDPOINT.to_string(),
            model: DEFAULT_STT_MODEL.to_string(),
            language: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Whisper-style JSON response body
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// HTTP transcriber for Whisper-compatible endpoints
pub struct HttpTranscriber {
    config: SttConfig,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(config: SttConfig) -> SttResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: Bytes) -> SttResult<Transcript> {
        debug!(bytes = audio.len(), "sending transcription request");

        let file_part = reqwest::multipart::Part::stream(audio)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone());
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;

        debug!(chars = parsed.text.len(), "transcription complete");
        Ok(Transcript {
            text: parsed.text,
            metadata: serde_json::Value::Object(parsed.extra),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> SttConfig {
        SttConfig {
            endpoint: format!("{}/v1/audio/transcriptions", server.uri()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_transcribe_returns_text_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello world",
                "language": "en",
                "duration": 1.5
            })))
            .mount(&server)
            .await;

        let transcriber = HttpTranscriber::new(test_config(&server)).unwrap();
        let result = transcriber
            .transcribe(Bytes::from_static(b"fake-wav"))
            .await
            .unwrap();

        assert_eq!(result.text, "hello world");
        assert_eq!(result.metadata["language"], "en");
    }

    #[tokio::test]
    async fn test_empty_text_is_ok_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": ""
            })))
            .mount(&server)
            .await;

        let transcriber = HttpTranscriber::new(test_config(&server)).unwrap();
        let result = transcriber
            .transcribe(Bytes::from_static(b"silence"))
            .await
            .unwrap();
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn test_service_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transcriber = HttpTranscriber::new(test_config(&server)).unwrap();
        let err = transcriber
            .transcribe(Bytes::from_static(b"fake-wav"))
            .await
            .unwrap_err();
        match err {
            SttError::Service { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Service error, got: {other:?}"),
        }
    }
}
