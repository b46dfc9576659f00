//! Call-lifecycle REST adapter (spec §6): the core "consumes but does not
//! define" these event-kind strings and fields, delivered by an external
//! event broker (e.g. an Azure Communication Services Event Grid
//! subscription). Each event is translated into a `MediaHandler`
//! lifecycle call — `attach`/`detach` happen against the session the
//! media-stream socket later connects with, keyed by `callConnectionId`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

use voice_core::call_context::CallContext;
use voice_media::DetachReason;

use crate::state::AppState;

/// Call metadata observed before the media-stream socket attaches,
/// indexed by `callConnectionId` (spec §3 `CallContext`).
#[derive(Default)]
pub struct CallRegistry {
    contexts: RwLock<HashMap<String, CallContext>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_incoming(&self, call_connection_id: &str) {
        self.contexts.write().insert(call_connection_id.to_string(), CallContext::new(None));
    }

    pub fn touch(&self, call_connection_id: &str) {
        if let Some(ctx) = self.contexts.write().get_mut(call_connection_id) {
            ctx.touch();
        }
    }

    pub fn set_participant(&self, call_connection_id: &str, participant_id: String) {
        if let Some(ctx) = self.contexts.write().get_mut(call_connection_id) {
            ctx.peer_participant_id = Some(participant_id);
        }
    }

    pub fn remove(&self, call_connection_id: &str) -> Option<CallContext> {
        self.contexts.write().remove(call_connection_id)
    }
}

/// One Event Grid-shaped event: `eventType` plus a free-form `data`
/// payload whose fields vary per kind (spec §6 table).
#[derive(Debug, Deserialize)]
pub struct CallLifecycleEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: Value,
}

pub async fn call_events_handler(
    State(state): State<AppState>,
    Json(events): Json<Vec<CallLifecycleEvent>>,
) -> StatusCode {
    for event in events {
        handle_event(&state, event).await;
    }
    StatusCode::OK
}

async fn handle_event(state: &AppState, event: CallLifecycleEvent) {
    let Some(call_connection_id) = event.data.get("callConnectionId").and_then(Value::as_str) else {
        tracing::warn!(event_type = %event.event_type, "call-lifecycle event missing callConnectionId");
        return;
    };

    match event.event_type.as_str() {
        "Microsoft.Communication.IncomingCall" => {
            state.call_registry.record_incoming(call_connection_id);
            tracing::info!(call_connection_id, "incoming call registered");
        }
        "CallConnected" => {
            state.call_registry.touch(call_connection_id);
            tracing::info!(call_connection_id, "call connected");
        }
        "ParticipantsUpdated" => {
            if let Some(participant) = event
                .data
                .get("participants")
                .and_then(Value::as_array)
                .and_then(|ps| ps.first())
                .and_then(|p| p.get("identifier"))
                .and_then(Value::as_str)
            {
                state.call_registry.set_participant(call_connection_id, participant.to_string());
            }
        }
        "RecognizeCompleted" => {
            tracing::debug!(call_connection_id, dtmf = ?event.data.get("recognizeResult"), "DTMF recognition completed");
        }
        "CallDisconnected" => {
            state.call_registry.remove(call_connection_id);
            if state.session_manager.get(call_connection_id).is_some() {
                state.session_manager.detach(call_connection_id, DetachReason::SocketClosed).await;
            }
            tracing::info!(call_connection_id, "call disconnected");
        }
        other => {
            tracing::debug!(event_type = other, "ignoring unrecognized call-lifecycle event kind");
        }
    }
}

pub type SharedCallRegistry = Arc<CallRegistry>;
