//! The error taxonomy shared by every crate in the media core (spec §7).
//!
//! Cancellation is deliberately not represented here: barge-in cancellation
//! unwinds through `Result<_, Cancelled>` in the crates that need it, never
//! through this enum, so a cancelled turn never gets logged as an error.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Socket blip, recognizer/synthesizer momentary failure. Recovered
    /// locally via reconnect and backoff; never surfaced to the caller.
    #[error("transient transport error: {0}")]
    TransientTransport(String),

    /// Socket closed by peer, lease lost, unrecoverable SDK error.
    #[error("fatal transport error: {0}")]
    FatalTransport(String),

    /// Orchestrator call, recognizer acquire, or stop-audio ack exceeded
    /// its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Malformed frame, unknown `kind`, non-base64 audio. Logged and
    /// dropped; never terminates the session.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// SessionStore unreachable.
    #[error("session state unavailable: {0}")]
    StateUnavailable(String),

    /// Recognizer or synthesizer could not be acquired after the retry
    /// budget was exhausted.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether this error should close the session (§7 propagation policy).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::FatalTransport(_) | CoreError::StateUnavailable(_)
        )
    }
}
