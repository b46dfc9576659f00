//! Top-level error type translating internal crate errors into HTTP
//! responses (grounded in the reference server's `ServerError`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Media(#[from] voice_media::MediaError),

    #[error(transparent)]
    Config(#[from] voice_config::ConfigError),

    #[error("no session attached with id '{0}'")]
    UnknownSession(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Media(voice_media::MediaError::CapacityExceeded) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Media(voice_media::MediaError::UnknownSession(_)) => StatusCode::NOT_FOUND,
            ServerError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Media(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
