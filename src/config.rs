//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - A `config.toml` file in the working directory, if present
//! - Environment variables prefixed with `APP_`
//! - The bare `HOST` / `PORT` variables deployment platforms like to set
//!
//! ## Key Rust Concepts Used:
//! - **Serde derive**: The same structs deserialize from TOML/env and serialize to JSON
//! - **Builder pattern**: `config::Config::builder()` stacks sources; later ones win
//! - **anyhow::Result**: Loading and validation errors carry readable context
//!
//! ## Environment variable naming:
//! Section and field are separated by a double underscore because field names
//! already contain single underscores:
//! - `APP_SERVER__PORT=3000`
//! - `APP_RECOGNIZER__ENDPOINT=wss://speech.example.com/v1/speech:streamingRecognize`
//! - `APP_STREAMING__SESSION_TIME_LIMIT_MS=290000`

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Complete application configuration.
///
/// ## Sections:
/// - **server**: Where the HTTP/WebSocket server listens
/// - **recognizer**: How to reach the remote streaming recognizer
/// - **streaming**: Endless-stream timing (session limit, restart pause, pull timeout)
/// - **performance**: Capacity limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub recognizer: RecognizerConfig,
    pub streaming: StreamingSettings,
    pub performance: PerformanceConfig,
}

/// Server bind address.
///
/// `127.0.0.1` only accepts local connections; use `0.0.0.0` to listen on every interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote recognizer connection settings.
///
/// Read once at startup when the recognizer client is built; runtime config
/// updates do not touch this section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// WebSocket URL of the streaming recognition endpoint
    pub endpoint: String,
    /// Sent as a bearer token when non-empty
    pub api_key: String,
    pub connect_timeout_ms: u64,
}

/// Timing of endless streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSettings {
    /// How long one recognition session may run before it is rotated
    pub session_time_limit_ms: u64,
    /// Pause between the end of one session and the start of the next
    pub restart_pause_ms: u64,
    /// How long a session waits for audio before re-checking for stop
    pub pull_timeout_ms: u64,
}

impl StreamingSettings {
    pub fn session_time_limit(&self) -> Duration {
        Duration::from_millis(self.session_time_limit_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}

/// Capacity limits.
///
/// ## Tuning guidelines:
/// - Every active stream holds one remote recognizer connection plus up to one
///   session's worth of audio for bridging, so memory grows with `max_concurrent_streams`
/// - `max_chunk_bytes` bounds a single client audio message
/// - `max_batch_audio_bytes` bounds the decoded audio of one batch transcription;
///   batch requests also take a stream slot while they run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_streams: usize,
    pub max_chunk_bytes: usize,
    pub max_batch_audio_bytes: usize,
}

impl PerformanceConfig {
    /// JSON body limit for batch requests: base64 inflates audio by 4/3
    pub fn batch_body_limit(&self) -> usize {
        self.max_batch_audio_bytes / 3 * 4 + 64 * 1024
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            recognizer: RecognizerConfig {
                endpoint: "ws://127.0.0.1:9090/v1/speech:streamingRecognize".to_string(),
                api_key: String::new(),
                connect_timeout_ms: 5000,
            },
            streaming: StreamingSettings {
                session_time_limit_ms: 240_000, // 4 minutes, under the provider's 5 minute cap
                restart_pause_ms: 100,
                pull_timeout_ms: 100,
            },
            performance: PerformanceConfig {
                max_concurrent_streams: 10,
                max_chunk_bytes: 1024 * 1024,
                max_batch_audio_bytes: 10 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and the environment.
    ///
    /// ## Loading order (later wins):
    /// 1. Built-in defaults
    /// 2. `config.toml` (optional)
    /// 3. `APP_*` environment variables
    /// 4. `HOST` / `PORT`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject values that would make the server or the streams misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.recognizer.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("Recognizer endpoint cannot be empty"));
        }

        if self.recognizer.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Recognizer connect timeout must be greater than 0"));
        }

        if self.streaming.session_time_limit_ms == 0 {
            return Err(anyhow::anyhow!("Session time limit must be greater than 0"));
        }

        if self.streaming.pull_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Pull timeout must be greater than 0"));
        }

        if self.streaming.pull_timeout_ms >= self.streaming.session_time_limit_ms {
            return Err(anyhow::anyhow!(
                "Pull timeout must be shorter than the session time limit"
            ));
        }

        if self.performance.max_concurrent_streams == 0 {
            return Err(anyhow::anyhow!("Max concurrent streams must be greater than 0"));
        }

        if self.performance.max_batch_audio_bytes == 0 {
            return Err(anyhow::anyhow!("Max batch audio size must be greater than 0"));
        }

        if self.performance.max_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("Max chunk size must be greater than 0"));
        }

        Ok(())
    }

    /// Apply a partial JSON update, e.g. `{"streaming": {"restart_pause_ms": 250}}`.
    ///
    /// Only fields present in the JSON change. The result is validated and, if it
    /// is invalid, `self` is left untouched. Streams already running keep the
    /// settings they started with.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;
        let mut updated = self.clone();

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                updated.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                updated.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port {} is out of range", port))?;
            }
        }

        if let Some(streaming) = partial.get("streaming") {
            if let Some(limit) = streaming.get("session_time_limit_ms").and_then(|v| v.as_u64()) {
                updated.streaming.session_time_limit_ms = limit;
            }
            if let Some(pause) = streaming.get("restart_pause_ms").and_then(|v| v.as_u64()) {
                updated.streaming.restart_pause_ms = pause;
            }
            if let Some(timeout) = streaming.get("pull_timeout_ms").and_then(|v| v.as_u64()) {
                updated.streaming.pull_timeout_ms = timeout;
            }
        }

        if let Some(performance) = partial.get("performance") {
            if let Some(streams) = performance.get("max_concurrent_streams").and_then(|v| v.as_u64()) {
                updated.performance.max_concurrent_streams = streams as usize;
            }
            if let Some(bytes) = performance.get("max_chunk_bytes").and_then(|v| v.as_u64()) {
                updated.performance.max_chunk_bytes = bytes as usize;
            }
            if let Some(bytes) = performance.get("max_batch_audio_bytes").and_then(|v| v.as_u64()) {
                updated.performance.max_batch_audio_bytes = bytes as usize;
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.streaming.session_time_limit(), Duration::from_secs(240));
        assert_eq!(config.streaming.restart_pause(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.streaming.session_time_limit_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.streaming.pull_timeout_ms = config.streaming.session_time_limit_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"streaming": {"restart_pause_ms": 250}, "performance": {"max_concurrent_streams": 4}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.streaming.restart_pause_ms, 250);
        assert_eq!(config.performance.max_concurrent_streams, 4);
        assert_eq!(config.streaming.session_time_limit_ms, 240_000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_update_leaves_config_untouched() {
        let mut config = AppConfig::default();
        let json = r#"{"streaming": {"session_time_limit_ms": 0, "restart_pause_ms": 999}}"#;
        assert!(config.update_from_json(json).is_err());
        assert_eq!(config, AppConfig::default());

        assert!(config.update_from_json(r#"{"server": {"port": 70000}}"#).is_err());
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_batch_body_limit_covers_encoded_audio() {
        let mut config = AppConfig::default();
        config.performance.max_batch_audio_bytes = 3000;
        assert_eq!(config.performance.batch_body_limit(), 4000 + 64 * 1024);

        config.performance.max_batch_audio_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(rendered.contains("[streaming]"));
        assert!(rendered.contains("session_time_limit_ms = 240000"));
    }
}
