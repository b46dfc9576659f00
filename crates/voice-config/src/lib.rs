//! Layered settings and agent-specification loading.
//!
//! Mirrors the reference server's `config` crate: a `config`-crate-backed
//! `Settings` loader plus a YAML agent-roster loader, both collapsed into
//! one crate since this workspace has no per-domain config split.

pub mod agents;
pub mod error;
pub mod settings;

pub use agents::{load_agent_roster, AgentRoster};
pub use error::ConfigError;
pub use settings::{
    load_settings, ServerConfig, Settings, SessionConfig, SpeechConfig, StreamingMode,
};
