//! Layered settings, following the reference `load_settings` pattern:
//! `config/default.{yaml,toml}` overlaid by `config/{env}.yaml`, overlaid
//! by environment variables with a `VOICE_AGENT__` separator.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Selects how `MediaHandler` wires a call at accept time (spec §4.4, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamingMode {
    /// Full recognizer -> orchestrator -> synthesizer loop.
    #[default]
    SttTts,
    /// Recognizer only; transcripts are surfaced, no synthesis.
    TranscriptionOnly,
    /// Audio is bridged to a pre-initialized passthrough agent connection;
    /// this core's recognizer/synthesizer/orchestrator are bypassed.
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Process-wide cap on live `MediaHandler`s (spec §5 "session cap");
    /// `attach` fails with `CapacityExceeded` once reached.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// How often the `SessionManager` sweeps handlers that have reached
    /// `Closing` but whose socket task hasn't yet been reaped.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_sessions() -> usize {
    256
}

fn default_sweep_interval_seconds() -> u64 {
    30
}

/// Pool sizing and recognizer/synthesizer tuning (spec §6 env table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub streaming_mode: StreamingMode,
    #[serde(default = "default_recognizer_pool_size")]
    pub recognizer_pool_size: usize,
    #[serde(default = "default_synthesizer_pool_size")]
    pub synthesizer_pool_size: usize,
    #[serde(default = "default_recognizer_languages")]
    pub recognizer_languages: Vec<String>,
    #[serde(default = "default_barge_in_stop_timeout_ms")]
    pub barge_in_stop_timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            streaming_mode: StreamingMode::default(),
            recognizer_pool_size: default_recognizer_pool_size(),
            synthesizer_pool_size: default_synthesizer_pool_size(),
            recognizer_languages: default_recognizer_languages(),
            barge_in_stop_timeout_ms: default_barge_in_stop_timeout_ms(),
        }
    }
}

fn default_recognizer_pool_size() -> usize {
    8
}

fn default_synthesizer_pool_size() -> usize {
    8
}

fn default_recognizer_languages() -> Vec<String> {
    vec!["en-US".to_string()]
}

fn default_barge_in_stop_timeout_ms() -> u64 {
    50
}

/// Session-store tuning (spec §4.1 TTL policy table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_turn_deadline_seconds")]
    pub turn_deadline_seconds: u64,
    #[serde(default)]
    pub entry_agent: Option<String>,
    /// Comma-joined ScyllaDB contact points; absent means use the
    /// in-memory `SessionStore` (local dev, tests).
    #[serde(default)]
    pub scylla_contact_points: Option<String>,
    #[serde(default = "default_keyspace")]
    pub scylla_keyspace: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: default_session_ttl_seconds(),
            turn_deadline_seconds: default_turn_deadline_seconds(),
            entry_agent: None,
            scylla_contact_points: None,
            scylla_keyspace: default_keyspace(),
        }
    }
}

fn default_session_ttl_seconds() -> u64 {
    1800
}

fn default_turn_deadline_seconds() -> u64 {
    30
}

fn default_keyspace() -> String {
    "voice_agent".to_string()
}

/// Root settings object, deserialized once at startup and shared
/// read-only for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Directory of per-agent YAML files (see `crate::agents`).
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
}

fn default_agents_dir() -> String {
    "config/agents".to_string()
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.speech.recognizer_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "speech.recognizer_pool_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.speech.synthesizer_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "speech.synthesizer_pool_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.speech.recognizer_languages.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "speech.recognizer_languages".to_string(),
                message: "must list at least one language".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads layered settings: `config/default` < `config/{env}` <
/// `VOICE_AGENT__*` environment variables, then validates the result.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let settings = Settings::default();
        assert_eq!(settings.speech.streaming_mode, StreamingMode::SttTts);
        assert_eq!(settings.speech.barge_in_stop_timeout_ms, 50);
        assert_eq!(settings.session.turn_deadline_seconds, 30);
        assert!(settings.session.entry_agent.is_none());
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut settings = Settings::default();
        settings.speech.recognizer_pool_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("VOICE_AGENT__SESSION__TURN_DEADLINE_SECONDS", "45");
        let settings = load_settings(None).expect("settings should load from env alone");
        assert_eq!(settings.session.turn_deadline_seconds, 45);
        std::env::remove_var("VOICE_AGENT__SESSION__TURN_DEADLINE_SECONDS");
    }
}
