//! Text-to-speech capability
//!
//! Defines the [`Synthesizer`] contract and an HTTP implementation for
//! OpenAI-compatible speech endpoints. Synthesis output is a single-channel
//! 16-bit PCM WAV byte stream at 24 kHz, delivered either as one buffer or
//! incrementally; both shapes satisfy [`AudioStream`].

mod http;

pub use http::{HttpSynthesizer, TtsConfig};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Result alias for synthesis operations
pub type TtsResult<T> = Result<T, TtsError>;

/// TTS error types
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("synthesis service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("synthesis stream failed: {0}")]
    Stream(String),
}

/// Incrementally arriving synthesized audio bytes
pub type AudioStream = Pin<Box<dyn Stream<Item = TtsResult<Bytes>> + Send>>;

/// Speech synthesis collaborator contract
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> TtsResult<AudioStream>;
}
