//! SpeechIO error taxonomy (spec §4.3).

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SpeechError {
    #[error("timed out waiting for a free client after {0:?}")]
    AcquireTimeout(std::time::Duration),

    #[error("could not acquire a client after the retry budget: {0}")]
    ServiceUnavailable(String),

    #[error("transient speech engine error: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, SpeechError>;

impl From<SpeechError> for voice_core::CoreError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::AcquireTimeout(_) | SpeechError::ServiceUnavailable(_) => {
                voice_core::CoreError::ServiceUnavailable(err.to_string())
            }
            SpeechError::Transient(msg) => voice_core::CoreError::TransientTransport(msg),
        }
    }
}
