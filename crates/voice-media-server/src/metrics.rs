//! Prometheus metrics endpoint (spec §6 ambient surface), grounded in the
//! reference server's `init_metrics`/`/metrics` pairing but rebuilt
//! against the crate version actually vendored in this workspace.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub async fn metrics_handler(axum::extract::State(state): axum::extract::State<crate::state::AppState>) -> String {
    state.metrics_handle.render()
}
