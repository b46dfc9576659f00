//! Liveness/readiness probes (spec §6 ambient surface), grounded in the
//! reference server's `health_check`/`readiness_check` pair.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Ready once the process is under its concurrent-session cap; a process
/// pinned at capacity still answers liveness checks but should stop
/// receiving new traffic from a load balancer.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let active = state.session_manager.count();
    let cap = state.settings.server.max_sessions;
    let body = serde_json::json!({
        "active_sessions": active,
        "max_sessions": cap,
    });
    (StatusCode::OK, Json(body))
}
