//! Shared application state

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::llm::{Generator, HttpGenerator};
use crate::core::stt::{HttpTranscriber, Transcriber};
use crate::core::tts::{HttpSynthesizer, Synthesizer};

/// Capability clients and configuration shared by all connections.
///
/// The capability fields are trait objects so tests and alternative
/// backends can swap implementations without touching the handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl AppState {
    /// Build the state with HTTP-backed capability clients.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let transcriber = Arc::new(HttpTranscriber::new(config.stt.clone())?);
        let generator = Arc::new(HttpGenerator::new(config.llm.clone())?);
        let synthesizer = Arc::new(HttpSynthesizer::new(config.tts.clone())?);
        Ok(Self {
            config,
            transcriber,
            generator,
            synthesizer,
        })
    }
}
