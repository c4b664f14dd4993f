//! WebSocket message types
//!
//! The wire protocol is a typed JSON envelope, discriminated on a `type`
//! field. Inbound and outbound shapes are closed unions: an unknown inbound
//! discriminant fails deserialization and is answered with an `error`
//! envelope, never a crash or a silent default.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from client
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One buffered utterance, base64-encoded WAV
    Audio { audio_data: String },

    /// Barge-in: stop the in-flight assistant turn
    Interrupt,

    /// Drop the conversation history (system context survives)
    ClearHistory,

    /// Generate and speak a greeting
    Greeting,

    /// Generate and speak a follow-up after user silence
    SilentFollowup {
        /// Escalation tier, 0..=2
        #[serde(default)]
        tier: u8,
    },

    /// Request the current system prompt
    GetSystemPrompt,

    /// Replace the system prompt
    UpdateSystemPrompt { prompt: String },

    /// Request the current user profile
    GetUserProfile,

    /// Update the user profile name
    UpdateUserProfile { name: String },

    /// Client liveness probe
    Ping,

    /// Client answer to a server keepalive ping; accepted silently
    Pong,
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outgoing WebSocket messages to client
///
/// Every envelope carries an RFC 3339 `timestamp`. Use the constructors
/// below; they stamp the current time.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Processing status update
    Status {
        status: String,
        data: Value,
        timestamp: String,
    },

    /// Structured error scoped to the current turn or request
    Error {
        error: String,
        details: Value,
        timestamp: String,
    },

    /// Transcript of the user's utterance
    Transcription {
        text: String,
        metadata: Value,
        timestamp: String,
    },

    /// Generated reply text
    LlmResponse {
        text: String,
        metadata: Value,
        timestamp: String,
    },

    /// Speech playback is about to start
    TtsStart { timestamp: String },

    /// One independently playable WAV chunk, base64-encoded
    TtsChunk {
        audio_chunk: String,
        format: String,
        timestamp: String,
    },

    /// Speech playback finished (suppressed when interrupted)
    TtsEnd { timestamp: String },

    /// Current system prompt
    SystemPrompt { prompt: String, timestamp: String },

    /// Acknowledgment of a system prompt update
    SystemPromptUpdated { success: bool, timestamp: String },

    /// Current user profile
    UserProfile { name: String, timestamp: String },

    /// Acknowledgment of a user profile update
    UserProfileUpdated { success: bool, timestamp: String },

    /// Server keepalive probe
    Ping { timestamp: String },

    /// Answer to a client ping
    Pong { timestamp: String },
}

fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

impl ServerMessage {
    pub fn status(status: impl Into<String>, data: Value) -> Self {
        Self::Status {
            status: status.into(),
            data,
            timestamp: now_timestamp(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::error_with_details(error, Value::Object(Default::default()))
    }

    pub fn error_with_details(error: impl Into<String>, details: Value) -> Self {
        Self::Error {
            error: error.into(),
            details,
            timestamp: now_timestamp(),
        }
    }

    pub fn transcription(text: impl Into<String>, metadata: Value) -> Self {
        Self::Transcription {
            text: text.into(),
            metadata,
            timestamp: now_timestamp(),
        }
    }

    pub fn llm_response(text: impl Into<String>, metadata: Value) -> Self {
        Self::LlmResponse {
            text: text.into(),
            metadata,
            timestamp: now_timestamp(),
        }
    }

    pub fn tts_start() -> Self {
        Self::TtsStart {
            timestamp: now_timestamp(),
        }
    }

    pub fn tts_chunk(audio_chunk: String) -> Self {
        Self::TtsChunk {
            audio_chunk,
            format: "wav".to_string(),
            timestamp: now_timestamp(),
        }
    }

    pub fn tts_end() -> Self {
        Self::TtsEnd {
            timestamp: now_timestamp(),
        }
    }

    pub fn system_prompt(prompt: impl Into<String>) -> Self {
        Self::SystemPrompt {
            prompt: prompt.into(),
            timestamp: now_timestamp(),
        }
    }

    pub fn system_prompt_updated(success: bool) -> Self {
        Self::SystemPromptUpdated {
            success,
            timestamp: now_timestamp(),
        }
    }

    pub fn user_profile(name: impl Into<String>) -> Self {
        Self::UserProfile {
            name: name.into(),
            timestamp: now_timestamp(),
        }
    }

    pub fn user_profile_updated(success: bool) -> Self {
        Self::UserProfileUpdated {
            success,
            timestamp: now_timestamp(),
        }
    }

    pub fn ping() -> Self {
        Self::Ping {
            timestamp: now_timestamp(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_message_deserialization() {
        let json = r#"{"type": "audio", "audio_data": "UklGRg=="}"#;
        let msg: ClientMessage = serde_json::from_str(json).expect("Should deserialize");
        match msg {
            ClientMessage::Audio { audio_data } => assert_eq!(audio_data, "UklGRg=="),
            _ => panic!("Expected Audio variant"),
        }
    }

    #[test]
    fn test_bare_control_messages_deserialize() {
        for (json, expected) in [
            (r#"{"type": "interrupt"}"#, ClientMessage::Interrupt),
            (r#"{"type": "clear_history"}"#, ClientMessage::ClearHistory),
            (r#"{"type": "greeting"}"#, ClientMessage::Greeting),
            (r#"{"type": "get_system_prompt"}"#, ClientMessage::GetSystemPrompt),
            (r#"{"type": "get_user_profile"}"#, ClientMessage::GetUserProfile),
            (r#"{"type": "ping"}"#, ClientMessage::Ping),
            (r#"{"type": "pong"}"#, ClientMessage::Pong),
        ] {
            let msg: ClientMessage = serde_json::from_str(json).expect("Should deserialize");
            assert_eq!(msg, expected);
        }
    }

    #[test]
    fn test_silent_followup_tier_defaults_to_zero() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "silent_followup"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SilentFollowup { tier: 0 });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "silent_followup", "tier": 2}"#).unwrap();
        assert_eq!(msg, ClientMessage::SilentFollowup { tier: 2 });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type": "selfdestruct"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_status_serialization() {
        let msg = ServerMessage::status("connected", serde_json::json!({"ready": true}));
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""status":"connected""#));
        assert!(json.contains(r#""timestamp":""#));
    }

    #[test]
    fn test_transcription_serialization() {
        let msg = ServerMessage::transcription("hello", serde_json::json!({}));
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""type":"transcription""#));
        assert!(json.contains(r#""text":"hello""#));
    }

    #[test]
    fn test_tts_chunk_serialization() {
        let msg = ServerMessage::tts_chunk("YWJj".to_string());
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""type":"tts_chunk""#));
        assert!(json.contains(r#""audio_chunk":"YWJj""#));
        assert!(json.contains(r#""format":"wav""#));
    }

    #[test]
    fn test_llm_response_tag() {
        let msg = ServerMessage::llm_response("hi", serde_json::json!({}));
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""type":"llm_response""#));
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = now_timestamp();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}
