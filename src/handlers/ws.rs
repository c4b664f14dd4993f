//! Session WebSocket handler
//!
//! Upgrades the HTTP connection and runs the per-connection session: a
//! dedicated sender task drains the outbound channel while the receive loop
//! parses inbound envelopes and dispatches them to the session manager.
//! A quiet receive window triggers an application-level keepalive ping.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::session::SessionManager;
use crate::state::AppState;

use super::messages::{ClientMessage, ServerMessage};

/// Outbound channel depth; sized for audio chunk bursts
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Session WebSocket endpoint
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one session over an established WebSocket
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let session_id = uuid::Uuid::new_v4();
    info!(%session_id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<ServerMessage>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            let json_str = match serde_json::to_string(&message) {
                Ok(json_str) => json_str,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json_str.into())).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let mut manager = SessionManager::new(&app_state, message_tx.clone());
    let keepalive = Duration::from_secs(app_state.config.keepalive_secs);

    // Connection-ready acknowledgment
    let _ = message_tx
        .send(ServerMessage::status("connected", serde_json::json!({})))
        .await;

    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        let continue_processing =
                            process_message(msg, &mut manager, &message_tx).await;
                        if !continue_processing {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%session_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(%session_id, "WebSocket connection closed by client");
                        break;
                    }
                }
            }
            // Quiet receive window: probe the client instead of assuming
            // the connection is gone
            _ = tokio::time::sleep(keepalive) => {
                debug!(%session_id, "receive window idle, sending keepalive ping");
                if message_tx.send(ServerMessage::ping()).await.is_err() {
                    break;
                }
            }
        }
    }

    // Cleanup
    manager.shutdown().await;
    sender_task.abort();
    info!(%session_id, "WebSocket connection terminated");
}

/// Process one inbound frame; returns false to terminate the connection
async fn process_message(
    msg: Message,
    manager: &mut SessionManager,
    message_tx: &mpsc::Sender<ServerMessage>,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!("Received text message: {} bytes", text.len());

            let incoming: ClientMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Failed to parse client message: {}", e);
                    let _ = message_tx
                        .send(ServerMessage::error(format!("Invalid message format: {e}")))
                        .await;
                    return true;
                }
            };

            manager.dispatch(incoming).await;
            true
        }
        Message::Binary(data) => {
            // The protocol is JSON-only; audio arrives base64-encoded in
            // an `audio` envelope
            debug!("Dropping unexpected binary frame: {} bytes", data.len());
            true
        }
        Message::Ping(_) => {
            debug!("Received ping");
            true
        }
        Message::Pong(_) => {
            debug!("Received pong");
            true
        }
        Message::Close(_) => {
            info!("WebSocket close received");
            false
        }
    }
}
