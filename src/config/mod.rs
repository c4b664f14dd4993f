//! Configuration module for the voicebridge server
//!
//! Configuration comes from built-in defaults overridden by either a `.env`
//! file / environment variables ([`ServerConfig::from_env`]) or a YAML file
//! ([`ServerConfig::from_file`]); the two sources are not mixed.
//!
//! # Example
//! ```rust,no_run
//! use voicebridge::config::ServerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::llm::LlmConfig;
use crate::core::stt::SttConfig;
use crate::core::tts::TtsConfig;

/// Default bind host
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port
const DEFAULT_PORT: u16 = 8080;

/// Default directory for the persisted system prompt and user profile
const DEFAULT_DATA_DIR: &str = "prompts";

/// Default quiet window before a keepalive ping is sent (seconds)
const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Configuration loading or validation error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
    #[error("invalid {field} endpoint {url}: {source}")]
    InvalidEndpoint {
        field: &'static str,
        url: String,
        source: url::ParseError,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Server configuration
///
/// Holds the bind address, the persisted-state directory, the WebSocket
/// keepalive window, and one config block per capability client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding `system_prompt.md` and `user_profile.json`
    pub data_dir: PathBuf,
    /// Seconds of receive-loop silence before a keepalive ping is sent
    pub keepalive_secs: u64,
    /// Speech-to-text client configuration
    pub stt: SttConfig,
    /// Text generation client configuration
    pub llm: LlmConfig,
    /// Speech synthesis client configuration
    pub tts: TtsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `VOICEBRIDGE_HOST`, `VOICEBRIDGE_PORT`,
    /// `VOICEBRIDGE_DATA_DIR`, `VOICEBRIDGE_KEEPALIVE_SECS`,
    /// `STT_ENDPOINT`, `STT_MODEL`, `LLM_ENDPOINT`, `LLM_MODEL`,
    /// `TTS_ENDPOINT`, `TTS_VOICE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("VOICEBRIDGE_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("VOICEBRIDGE_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "VOICEBRIDGE_PORT".to_string(),
                value: port,
            })?;
        }
        if let Ok(dir) = std::env::var("VOICEBRIDGE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("VOICEBRIDGE_KEEPALIVE_SECS") {
            config.keepalive_secs = secs.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "VOICEBRIDGE_KEEPALIVE_SECS".to_string(),
                value: secs,
            })?;
        }
        if let Ok(endpoint) = std::env::var("STT_ENDPOINT") {
            config.stt.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("STT_MODEL") {
            config.stt.model = model;
        }
        if let Ok(endpoint) = std::env::var("LLM_ENDPOINT") {
            config.llm.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(endpoint) = std::env::var("TTS_ENDPOINT") {
            config.tts.endpoint = endpoint;
        }
        if let Ok(voice) = std::env::var("TTS_VOICE") {
            config.tts.voice = voice;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file. Fields the file leaves unset fall
    /// back to the built-in defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The socket address string this server binds to
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.keepalive_secs == 0 {
            return Err(ConfigError::Invalid(
                "keepalive_secs must be greater than zero".to_string(),
            ));
        }
        for (field, endpoint) in [
            ("stt", &self.stt.endpoint),
            ("llm", &self.llm.endpoint),
            ("tts", &self.tts.endpoint),
        ] {
            url::Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
                field,
                url: endpoint.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = ServerConfig {
            stt: SttConfig {
                endpoint: "not a url".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { field: "stt", .. }));
    }

    #[test]
    fn test_zero_keepalive_rejected() {
        let config = ServerConfig {
            keepalive_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "port: 9001\nkeepalive_secs: 15\nllm:\n  model: local-chat\n",
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.keepalive_secs, 15);
        assert_eq!(config.llm.model, "local-chat");
        // Unset fields fall back to defaults
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_yaml_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "prot: 9001\n").unwrap();
        assert!(matches!(
            ServerConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
