//! Per-connection session manager
//!
//! One manager per WebSocket connection. It owns the conversation store,
//! dispatches inbound messages, and enforces the single-turn invariant:
//! at most one turn runs at a time, and starting a new one first cancels
//! and awaits the previous turn so their emissions never interleave.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handlers::messages::{ClientMessage, ServerMessage};
use crate::session::store::ConversationStore;
use crate::session::turn::{TurnController, TurnRequest};
use crate::state::AppState;

pub struct SessionManager {
    controller: Arc<TurnController>,
    store: Arc<RwLock<ConversationStore>>,
    message_tx: mpsc::Sender<ServerMessage>,
    current_turn: Option<(CancellationToken, JoinHandle<()>)>,
}

impl SessionManager {
    pub fn new(state: &AppState, message_tx: mpsc::Sender<ServerMessage>) -> Self {
        let store = Arc::new(RwLock::new(ConversationStore::open(&state.config.data_dir)));
        let controller = Arc::new(TurnController::new(
            Arc::clone(&state.transcriber),
            Arc::clone(&state.generator),
            Arc::clone(&state.synthesizer),
            Arc::clone(&store),
            message_tx.clone(),
        ));
        Self {
            controller,
            store,
            message_tx,
            current_turn: None,
        }
    }

    /// Handle one inbound message. Never fails the connection: every error
    /// is reported to the client as an `error` envelope.
    pub async fn dispatch(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Audio { audio_data } => self.handle_audio(audio_data).await,
            ClientMessage::Interrupt => {
                self.interrupt_current().await;
                self.emit(ServerMessage::status("interrupted", json!({}))).await;
            }
            ClientMessage::ClearHistory => {
                {
                    let mut store = self.store.write().await;
                    store.clear_history();
                    // the generator should keep knowing the user's name
                    store.upsert_user_context();
                }
                self.emit(ServerMessage::status("history_cleared", json!({}))).await;
            }
            ClientMessage::Greeting => self.start_turn(TurnRequest::Greeting).await,
            ClientMessage::SilentFollowup { tier } => {
                self.start_turn(TurnRequest::Followup(tier)).await
            }
            ClientMessage::GetSystemPrompt => {
                let prompt = self.store.read().await.system_prompt().to_string();
                self.emit(ServerMessage::system_prompt(prompt)).await;
            }
            ClientMessage::UpdateSystemPrompt { prompt } => {
                self.handle_update_system_prompt(prompt).await
            }
            ClientMessage::GetUserProfile => {
                let name = self.store.read().await.user_name().to_string();
                self.emit(ServerMessage::user_profile(name)).await;
            }
            ClientMessage::UpdateUserProfile { name } => {
                self.handle_update_user_profile(name).await
            }
            ClientMessage::Ping => self.emit(ServerMessage::pong()).await,
            ClientMessage::Pong => debug!("keepalive pong received"),
        }
    }

    async fn handle_audio(&mut self, audio_data: String) {
        let audio = match BASE64.decode(&audio_data) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(error = %e, "rejecting malformed audio payload");
                self.emit(ServerMessage::error(format!("Invalid audio payload: {e}")))
                    .await;
                return;
            }
        };
        info!(bytes = audio.len(), "received utterance");
        self.emit(ServerMessage::status("audio_processing", json!({}))).await;
        self.start_turn(TurnRequest::Audio(audio)).await;
    }

    async fn handle_update_system_prompt(&mut self, prompt: String) {
        if prompt.trim().is_empty() {
            self.emit(ServerMessage::error("System prompt cannot be empty"))
                .await;
            self.emit(ServerMessage::system_prompt_updated(false)).await;
            return;
        }
        let result = self.store.write().await.set_system_prompt(prompt);
        match result {
            Ok(()) => self.emit(ServerMessage::system_prompt_updated(true)).await,
            Err(e) => {
                warn!(error = %e, "system prompt update not persisted");
                self.emit(ServerMessage::error(e.to_string())).await;
                self.emit(ServerMessage::system_prompt_updated(false)).await;
            }
        }
    }

    async fn handle_update_user_profile(&mut self, name: String) {
        let result = {
            let mut store = self.store.write().await;
            let result = store.set_user_name(name);
            if result.is_ok() {
                store.upsert_user_context();
            }
            result
        };
        match result {
            Ok(()) => self.emit(ServerMessage::user_profile_updated(true)).await,
            Err(e) => {
                warn!(error = %e, "user profile update not persisted");
                self.emit(ServerMessage::error(e.to_string())).await;
                self.emit(ServerMessage::user_profile_updated(false)).await;
            }
        }
    }

    /// Cancel and await the in-flight turn, then spawn the new one.
    async fn start_turn(&mut self, request: TurnRequest) {
        self.interrupt_current().await;
        let cancel = CancellationToken::new();
        let controller = Arc::clone(&self.controller);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            controller.run(request, token).await;
        });
        self.current_turn = Some((cancel, handle));
    }

    /// Cancel the in-flight turn, if any, and wait for it to wind down so
    /// no stale emission can follow.
    pub async fn interrupt_current(&mut self) {
        if let Some((cancel, handle)) = self.current_turn.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "turn task failed during interrupt");
            }
        }
    }

    /// Wait for the in-flight turn to finish without cancelling it.
    pub async fn wait_for_turn(&mut self) {
        if let Some((_, handle)) = self.current_turn.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "turn task failed");
        }
    }

    /// Tear down on connection close.
    pub async fn shutdown(&mut self) {
        self.interrupt_current().await;
        debug!("session shut down");
    }

    async fn emit(&self, message: ServerMessage) {
        let _ = self.message_tx.send(message).await;
    }
}
