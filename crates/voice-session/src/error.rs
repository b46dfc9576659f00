//! SessionStore error taxonomy (spec §4.1).

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("no session record for {0}")]
    NotFound(String),

    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("archive failed for {session_id}: {reason}")]
    ArchiveFailed { session_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<SessionError> for voice_core::CoreError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => {
                voice_core::CoreError::StateUnavailable(format!("no session record for {id}"))
            }
            SessionError::Unavailable(msg) => voice_core::CoreError::StateUnavailable(msg),
            SessionError::ArchiveFailed { session_id, reason } => {
                voice_core::CoreError::StateUnavailable(format!(
                    "archive failed for {session_id}: {reason}"
                ))
            }
        }
    }
}
