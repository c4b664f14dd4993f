//! Speech-to-text capability
//!
//! Defines the [`Transcriber`] contract consumed by the session layer and an
//! HTTP implementation for Whisper-compatible transcription endpoints.

mod http;

pub use http::{HttpTranscriber, SttConfig};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Result alias for STT operations
pub type SttResult<T> = Result<T, SttError>;

/// STT error types
#[derive(Debug, Error)]
pub enum SttError {
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transcription service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("invalid transcription response: {0}")]
    InvalidResponse(String),
}

/// A completed transcription.
///
/// `text` is empty (not an error) when the audio carried no recognizable
/// speech.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Transcribed text
    pub text: String,
    /// Provider-specific metadata (language, duration, ...)
    pub metadata: serde_json::Value,
}

/// Speech-to-text collaborator contract.
///
/// Accepts a complete WAV-framed byte buffer and returns the transcript.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Bytes) -> SttResult<Transcript>;
}
