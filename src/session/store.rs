//! Conversation state store
//!
//! Owns the persisted system prompt and user profile (load-or-default on
//! open, durable write on every mutation) and the in-memory conversation
//! history used as generation context.
//!
//! History invariants: a system-role entry, when present, sits at index 0;
//! at most one user-context entry exists, always at index 1, and updates
//! replace it rather than append. History itself is never written to disk —
//! it is rebuilt per process lifetime.
//!
//! A failed persist keeps the in-memory value authoritative and reports the
//! failure to the caller, so the client can be told without rolling back.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::llm::{ChatMessage, Role};

/// File name of the persisted system prompt
const PROMPT_FILE: &str = "system_prompt.md";

/// File name of the persisted user profile
const PROFILE_FILE: &str = "user_profile.json";

/// Marker prefix of the user-context history entry
const USER_CONTEXT_PREFIX: &str = "USER CONTEXT:";

/// History entries (beyond the leading system entry) included in a
/// silent-follow-up context
const FOLLOWUP_CONTEXT_LEN: usize = 6;

/// Built-in system prompt used until a client sets one
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, friendly, and concise voice assistant. \
     Respond to user queries in a natural, conversational manner. \
     Keep responses brief and to the point, as you're communicating via voice. \
     When providing information, focus on the most relevant details. \
     If you don't know something, admit it rather than making up an answer.";

/// Persistence error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode user profile: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted user profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
}

/// Per-session conversation state
#[derive(Debug)]
pub struct ConversationStore {
    prompt_path: PathBuf,
    profile_path: PathBuf,
    system_prompt: String,
    profile: UserProfile,
    history: Vec<ChatMessage>,
}

impl ConversationStore {
    /// Open the store backed by `data_dir`, creating the directory and
    /// default files on first run. Read failures are logged and defaults
    /// substituted; they never prevent a session from starting.
    pub fn open(data_dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(data_dir) {
            warn!(dir = %data_dir.display(), error = %e, "failed to create data directory");
        }
        let prompt_path = data_dir.join(PROMPT_FILE);
        let profile_path = data_dir.join(PROFILE_FILE);

        let system_prompt = load_system_prompt(&prompt_path);
        let profile = load_user_profile(&profile_path);

        Self {
            prompt_path,
            profile_path,
            system_prompt,
            profile,
            history: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Replace the system prompt in memory, in the history's leading entry,
    /// and on disk. The in-memory value stays authoritative even when the
    /// write fails.
    pub fn set_system_prompt(&mut self, prompt: String) -> Result<(), StoreError> {
        self.system_prompt = prompt;
        if let Some(first) = self.history.first_mut()
            && first.role == Role::System
            && !first.content.starts_with(USER_CONTEXT_PREFIX)
        {
            first.content = self.system_prompt.clone();
        }
        std::fs::write(&self.prompt_path, &self.system_prompt).map_err(|source| {
            StoreError::Write {
                path: self.prompt_path.clone(),
                source,
            }
        })
    }

    pub fn user_name(&self) -> &str {
        &self.profile.name
    }

    /// Set the profile name and persist the profile.
    pub fn set_user_name(&mut self, name: String) -> Result<(), StoreError> {
        self.profile.name = name;
        let encoded = serde_json::to_string_pretty(&self.profile)?;
        std::fs::write(&self.profile_path, encoded).map_err(|source| StoreError::Write {
            path: self.profile_path.clone(),
            source,
        })
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    /// Make sure the history leads with a system entry holding the current
    /// prompt.
    pub fn ensure_system_entry(&mut self) {
        match self.history.first() {
            Some(first) if first.role == Role::System => {}
            _ => self
                .history
                .insert(0, ChatMessage::system(self.system_prompt.clone())),
        }
    }

    /// Insert or replace the user-context entry at index 1.
    ///
    /// No-op when the profile has no name. Ensures the leading system entry
    /// exists first, so the context entry always lands at index 1.
    pub fn upsert_user_context(&mut self) {
        if self.profile.name.is_empty() {
            return;
        }
        self.ensure_system_entry();
        let entry = ChatMessage::system(format!(
            "{USER_CONTEXT_PREFIX} The user's name is {}.",
            self.profile.name
        ));
        match self.history.get(1) {
            Some(second)
                if second.role == Role::System
                    && second.content.starts_with(USER_CONTEXT_PREFIX) =>
            {
                self.history[1] = entry;
            }
            _ => self.history.insert(1, entry),
        }
    }

    /// Append one completed user/assistant exchange.
    pub fn record_exchange(&mut self, user: &str, assistant: &str) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(assistant));
    }

    /// Drop the conversation, keeping the leading system entry.
    pub fn clear_history(&mut self) {
        let system = match self.history.first() {
            Some(first) if first.role == Role::System
                && !first.content.starts_with(USER_CONTEXT_PREFIX) =>
            {
                Some(first.clone())
            }
            _ => None,
        };
        self.history.clear();
        if let Some(system) = system {
            self.history.push(system);
        }
        info!("conversation history cleared");
    }

    /// Take the whole history out, leaving it empty. Pair with
    /// [`restore_history`](Self::restore_history).
    pub fn take_history(&mut self) -> Vec<ChatMessage> {
        std::mem::take(&mut self.history)
    }

    /// Put back a history previously taken with
    /// [`take_history`](Self::take_history).
    pub fn restore_history(&mut self, history: Vec<ChatMessage>) {
        self.history = history;
    }

    /// Build the trimmed context for a silent-follow-up turn: the leading
    /// system entry (when present) plus at most the last six entries.
    pub fn followup_context(&self) -> Vec<ChatMessage> {
        let (system, rest) = match self.history.first() {
            Some(first) if first.role == Role::System => {
                (Some(first.clone()), &self.history[1..])
            }
            _ => (None, &self.history[..]),
        };
        let tail_start = rest.len().saturating_sub(FOLLOWUP_CONTEXT_LEN);
        let mut context = Vec::with_capacity(1 + FOLLOWUP_CONTEXT_LEN);
        context.extend(system);
        context.extend_from_slice(&rest[tail_start..]);
        context
    }
}

fn load_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => return contents.trim().to_string(),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read system prompt, using default");
            return DEFAULT_SYSTEM_PROMPT.to_string();
        }
    }
    // First run or empty file: seed the default
    if let Err(e) = std::fs::write(path, DEFAULT_SYSTEM_PROMPT) {
        warn!(path = %path.display(), error = %e, "failed to seed default system prompt");
    }
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn load_user_profile(path: &Path) -> UserProfile {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(profile) => return profile,
            Err(e) => {
                error!(path = %path.display(), error = %e, "malformed user profile, using default");
                return UserProfile::default();
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read user profile, using default");
            return UserProfile::default();
        }
    }
    let default = UserProfile::default();
    match serde_json::to_string_pretty(&default) {
        Ok(encoded) => {
            if let Err(e) = std::fs::write(path, encoded) {
                warn!(path = %path.display(), error = %e, "failed to seed default user profile");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode default user profile"),
    }
    default
}
