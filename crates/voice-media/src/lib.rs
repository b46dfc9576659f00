//! MediaHandler (spec §4.4): the three-lane concurrency engine that
//! bridges one telephony/browser socket to the recognizer, orchestrator,
//! and synthesizer, implementing the wire protocol, the barge-in
//! algorithm, and the session lifecycle.

pub mod error;
pub mod handler;
pub mod passthrough;
pub mod phrase_speaker;
pub mod session_manager;
pub mod state;
pub mod transport;
pub mod wire;

pub use error::{MediaError, Result};
pub use handler::{DetachReason, MediaHandler, MediaHandlerConfig, MediaHandlerDeps};
pub use passthrough::PassthroughConnector;
pub use phrase_speaker::SynthesizingPhraseSpeaker;
pub use session_manager::SessionManager;
pub use state::{MediaState, SessionState};
pub use transport::{TransportReceiver, TransportSender};
pub use wire::{InboundFrame, OutboundFrame};
