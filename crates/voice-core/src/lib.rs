//! Core types shared across the voice-agent media core.
//!
//! This crate has no async runtime and no I/O; every other crate in the
//! workspace depends on it for the vocabulary of the system (`CoreMemory`,
//! `ToolEnvelope`, `AgentSpec`, audio frames, and the error taxonomy).

pub mod agent_spec;
pub mod audio;
pub mod call_context;
pub mod error;
pub mod memory;

pub use agent_spec::{AgentSpec, ModelSpec, PromptsSpec, VoiceSpec};
pub use audio::{AudioFrame, Channels, SampleRate};
pub use call_context::CallContext;
pub use error::{CoreError, Result};
pub use memory::{CoreMemory, Handoff, HistoryEntry, HistoryPolicy, Role, ToolEnvelope};

/// A stable opaque session identifier (spec §3): the telephony
/// call-connection id, or a client-chosen id for browser sessions.
pub type SessionId = String;
