//! Turn state machine
//!
//! A turn is one listen → transcribe → generate → synthesize → speak cycle
//! (or a truncated subset). The controller drives the capability clients in
//! order, re-frames synthesis output into playable chunks, and emits outbound
//! envelopes over the session's sender channel.
//!
//! Interruption is cooperative: the per-turn [`CancellationToken`] is checked
//! before every client-visible emission and after every capability await.
//! Work already dispatched to a capability is not aborted; its result is
//! discarded once the token is set. Per-turn emission order is strict —
//! transcript, reply text, speech start, chunks in byte order, speech end —
//! and interruption can only truncate the sequence, never reorder it.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::audio::AudioReframer;
use crate::core::llm::{ChatMessage, GenerationRequest, Generator, LlmError};
use crate::core::stt::{SttError, Transcriber};
use crate::core::tts::{Synthesizer, TtsError};
use crate::handlers::messages::ServerMessage;
use crate::session::store::ConversationStore;

/// Sampling temperature for greeting and follow-up generation
const VARIETY_TEMPERATURE: f32 = 0.7;

/// Turn lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Listening,
    Transcribing,
    Generating,
    Synthesizing,
    Speaking,
    Interrupted,
}

/// The work a single turn performs
#[derive(Debug)]
pub enum TurnRequest {
    /// Standard turn on one buffered utterance (WAV bytes)
    Audio(Bytes),
    /// Greeting turn; does not touch persisted history
    Greeting,
    /// Silent-follow-up turn at the given escalation tier (0..=2)
    Followup(u8),
}

/// Turn-scoped failure from a capability call
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("transcription failed: {0}")]
    Stt(#[from] SttError),

    #[error("generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("synthesis failed: {0}")]
    Tts(#[from] TtsError),
}

/// Drives one session's turns against the injected capability clients.
pub struct TurnController {
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
    store: Arc<RwLock<ConversationStore>>,
    message_tx: mpsc::Sender<ServerMessage>,
    state: Arc<Mutex<TurnState>>,
}

impl TurnController {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
        store: Arc<RwLock<ConversationStore>>,
        message_tx: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            store,
            message_tx,
            state: Arc::new(Mutex::new(TurnState::Idle)),
        }
    }

    /// Current turn state
    pub fn state(&self) -> TurnState {
        *self.state.lock()
    }

    fn set_state(&self, state: TurnState) {
        debug!(?state, "turn state");
        *self.state.lock() = state;
    }

    /// Run one turn to completion.
    ///
    /// Capability failures abort the turn with an `error` envelope; they are
    /// never fatal to the session. The controller always returns to `Idle`.
    pub async fn run(&self, request: TurnRequest, cancel: CancellationToken) {
        let result = match request {
            TurnRequest::Audio(audio) => self.audio_turn(audio, &cancel).await,
            TurnRequest::Greeting => self.greeting_turn(&cancel).await,
            TurnRequest::Followup(tier) => self.followup_turn(tier, &cancel).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "turn aborted");
            self.emit(ServerMessage::error_with_details(
                e.to_string(),
                json!({ "scope": "turn" }),
            ))
            .await;
        }
        if cancel.is_cancelled() {
            self.set_state(TurnState::Interrupted);
        }
        self.set_state(TurnState::Idle);
    }

    async fn audio_turn(&self, audio: Bytes, cancel: &CancellationToken) -> Result<(), TurnError> {
        self.set_state(TurnState::Listening);
        self.set_state(TurnState::Transcribing);
        self.emit(ServerMessage::status("transcribing", json!({}))).await;

        let transcript = self.transcriber.transcribe(audio).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.emit(ServerMessage::transcription(
            transcript.text.clone(),
            transcript.metadata,
        ))
        .await;

        // Silence misclassified as speech: stop here rather than waste
        // generation and synthesis calls
        if transcript.text.trim().is_empty() {
            info!("empty transcription, skipping generation and synthesis");
            return Ok(());
        }

        self.set_state(TurnState::Generating);
        self.emit(ServerMessage::status("processing_llm", json!({}))).await;

        let (system_prompt, context) = {
            let mut store = self.store.write().await;
            store.ensure_system_entry();
            (store.system_prompt().to_string(), store.history().to_vec())
        };
        let generation = self
            .generator
            .generate(GenerationRequest {
                input: &transcript.text,
                system_prompt: &system_prompt,
                context: &context,
                temperature: None,
            })
            .await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.store
            .write()
            .await
            .record_exchange(&transcript.text, &generation.text);

        self.emit(ServerMessage::llm_response(
            generation.text.clone(),
            generation.metadata,
        ))
        .await;

        self.speak(&generation.text, cancel).await
    }

    async fn greeting_turn(&self, cancel: &CancellationToken) -> Result<(), TurnError> {
        self.set_state(TurnState::Generating);

        // Snapshot and clear the history so the greeting is generated
        // without conversational context and leaves no trace of the
        // instruction behind
        let (snapshot, instruction, system_prompt) = {
            let mut store = self.store.write().await;
            let returning = store.has_history();
            let instruction = greeting_instruction(store.user_name(), returning);
            let snapshot = store.take_history();
            (snapshot, instruction, store.system_prompt().to_string())
        };

        info!(returning = !snapshot.is_empty(), "generating greeting");
        let result = self
            .generator
            .generate(GenerationRequest {
                input: &instruction,
                system_prompt: &system_prompt,
                context: &[],
                temperature: Some(VARIETY_TEMPERATURE),
            })
            .await;

        // Single cleanup step on every exit path: restore the snapshot,
        // then re-assert the user-context entry
        {
            let mut store = self.store.write().await;
            store.restore_history(snapshot);
            store.upsert_user_context();
        }

        let generation = result?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.emit(ServerMessage::llm_response(
            generation.text.clone(),
            generation.metadata,
        ))
        .await;
        self.speak(&generation.text, cancel).await
    }

    async fn followup_turn(&self, tier: u8, cancel: &CancellationToken) -> Result<(), TurnError> {
        self.set_state(TurnState::Generating);

        // The trimmed context is a copy; persisted history is never touched
        let (system_prompt, mut context) = {
            let store = self.store.read().await;
            (store.system_prompt().to_string(), store.followup_context())
        };
        let marker = silence_marker(tier);
        context.push(ChatMessage::system(format!(
            "The user has gone quiet. Respond with a {}. Keep it to one short sentence.",
            followup_register(tier)
        )));

        info!(tier, marker, "generating silent follow-up");
        let generation = self
            .generator
            .generate(GenerationRequest {
                input: marker,
                system_prompt: &system_prompt,
                context: &context,
                temperature: Some(VARIETY_TEMPERATURE),
            })
            .await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.emit(ServerMessage::llm_response(
            generation.text.clone(),
            generation.metadata,
        ))
        .await;
        self.speak(&generation.text, cancel).await
    }

    /// Synthesize `text` and stream re-framed chunks to the client.
    ///
    /// `tts_start` goes out on the first audio bytes; `tts_end` only when the
    /// whole stream was delivered uninterrupted. On interruption the chunk
    /// flow simply stops — the client cut playback itself, so no end marker
    /// is sent.
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<(), TurnError> {
        if text.trim().is_empty() {
            debug!("empty text for synthesis, skipping");
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.set_state(TurnState::Synthesizing);
        self.emit(ServerMessage::status("generating_speech", json!({}))).await;

        let mut stream = self.synthesizer.synthesize(text).await?;
        let mut reframer = AudioReframer::new();
        let mut started = false;
        let mut chunk_count = 0u32;

        while let Some(block) = stream.next().await {
            let block = block?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            for chunk in reframer.push(&block) {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                if !started {
                    self.emit(ServerMessage::tts_start()).await;
                    self.set_state(TurnState::Speaking);
                    started = true;
                }
                chunk_count += 1;
                self.emit(ServerMessage::tts_chunk(BASE64.encode(&chunk))).await;
            }
        }

        if let Some(rest) = reframer.finish() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if !started {
                self.emit(ServerMessage::tts_start()).await;
                self.set_state(TurnState::Speaking);
                started = true;
            }
            chunk_count += 1;
            self.emit(ServerMessage::tts_chunk(BASE64.encode(&rest))).await;
        }

        if started && !cancel.is_cancelled() {
            self.emit(ServerMessage::tts_end()).await;
        }
        info!(chunks = chunk_count, "speech delivery complete");
        Ok(())
    }

    async fn emit(&self, message: ServerMessage) {
        let _ = self.message_tx.send(message).await;
    }
}

/// Build the greeting instruction, phrased for first-time vs returning users
/// and personalized when a name is set. Sent as the *user* message of the
/// generation; never appended to history.
fn greeting_instruction(name: &str, returning: bool) -> String {
    let audience = if name.is_empty() {
        "someone".to_string()
    } else {
        name.to_string()
    };
    let familiarity = if returning {
        "you've met them before"
    } else {
        "you're meeting them for the first time"
    };
    format!(
        "Create a friendly greeting for {audience} who just activated their microphone. \
         Be brief and conversational, but treat it like {familiarity}. Do not do anything else."
    )
}

/// Silence marker substituted as the user message of a follow-up turn
fn silence_marker(tier: u8) -> &'static str {
    match tier {
        0 => "[silent]",
        1 => "[no response]",
        _ => "[still waiting]",
    }
}

/// Register the follow-up escalates through as the silence continues
fn followup_register(tier: u8) -> &'static str {
    match tier {
        0 => "gentle check-in",
        1 => "casual follow-up",
        _ => "friendly reminder",
    }
}
