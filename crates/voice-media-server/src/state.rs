//! Process-wide shared state (grounded in the reference server's
//! `AppState`): everything a connection handler needs to attach a
//! `MediaHandler`, held behind `Arc` and cloned per request.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use voice_agent_rt::{AgentRegistry, Orchestrator};
use voice_config::Settings;
use voice_media::SessionManager;
use voice_session::SessionStore;
use voice_speech::RecognizerPool;

use crate::events::CallRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<AgentRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub recognizer_pool: Arc<RecognizerPool>,
    pub session_store: Arc<dyn SessionStore>,
    pub session_manager: Arc<SessionManager>,
    /// Identifies this process as a lease holder; distinct per run so a
    /// restarted process doesn't inherit a stale lease from its old PID.
    pub holder_id: Arc<str>,
    pub metrics_handle: PrometheusHandle,
    pub call_registry: Arc<CallRegistry>,
}
