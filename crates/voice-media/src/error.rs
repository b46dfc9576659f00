use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error(transparent)]
    Core(#[from] voice_core::CoreError),

    #[error(transparent)]
    Session(#[from] voice_session::SessionError),

    #[error(transparent)]
    Speech(#[from] voice_speech::SpeechError),

    #[error("transport send failed: {0}")]
    TransportSend(String),

    #[error("max concurrent sessions reached")]
    CapacityExceeded,

    #[error("no session attached with id '{0}'")]
    UnknownSession(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
