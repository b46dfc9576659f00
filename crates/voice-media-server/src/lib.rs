//! The process that terminates the media-stream WebSocket and the
//! call-lifecycle REST adapter, wiring `voice-media`'s `MediaHandler`
//! against concrete `SessionStore`, `RecognizerPool`, `SynthesizerPool`,
//! `AgentRegistry`, and `Orchestrator` instances (spec §2, §6).

pub mod demo_handler;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use error::ServerError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Assembles the router (grounded in the reference `create_router`),
/// trimmed to the surfaces this core defines (spec §6): the media-stream
/// socket, the call-lifecycle event sink, health/readiness, and metrics.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/media/stream", get(websocket::media_stream_handler))
        .route("/api/v1/events", post(events::call_events_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
