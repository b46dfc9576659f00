//! The media-stream WebSocket upgrade (spec §6): adapts an axum
//! `WebSocket` into the `TransportReceiver`/`TransportSender` halves
//! `MediaHandler` is built against, grounded in the reference server's
//! `WebSocketHandler::handle_socket` split-and-wrap-in-Arc<Mutex<_>>
//! shape (`server::websocket`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;

use voice_config::StreamingMode;
use voice_core::audio::SampleRate;
use voice_media::{DetachReason, MediaError, MediaHandler, MediaHandlerConfig, MediaHandlerDeps, TransportReceiver, TransportSender};
use voice_session::ttl;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MediaStreamQuery {
    pub call_connection_id: String,
    pub session_id: Option<String>,
}

struct WsReceiver {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl TransportReceiver for WsReceiver {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket read error");
                    return None;
                }
            }
        }
    }
}

struct WsSender {
    inner: Arc<AsyncMutex<SplitSink<WebSocket, Message>>>,
}

#[async_trait]
impl TransportSender for WsSender {
    async fn send_text(&mut self, text: String) -> Result<(), MediaError> {
        self.inner
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| MediaError::TransportSend(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.inner.lock().await.send(Message::Close(None)).await;
    }
}

pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<MediaStreamQuery>,
) -> Response {
    let session_id = query.session_id.unwrap_or_else(|| query.call_connection_id.clone());
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (sink, stream) = socket.split();
    let receiver: Box<dyn TransportReceiver> = Box::new(WsReceiver { inner: stream });
    let sender: Box<dyn TransportSender> = Box::new(WsSender { inner: Arc::new(AsyncMutex::new(sink)) });

    let sample_rate = match state.settings.speech.streaming_mode {
        StreamingMode::Passthrough => SampleRate::Hz24000,
        _ => SampleRate::Hz16000,
    };

    let config = MediaHandlerConfig {
        session_id: session_id.clone(),
        streaming_mode: state.settings.speech.streaming_mode,
        sample_rate,
        languages: state.settings.speech.recognizer_languages.clone(),
        diarization: false,
        session_ttl: Duration::from_secs(state.settings.session.session_ttl_seconds),
        lease_ttl: ttl::LEASE,
        holder_id: state.holder_id.to_string(),
    };

    let deps = MediaHandlerDeps {
        recognizer_pool: state.recognizer_pool.clone(),
        orchestrator: state.orchestrator.clone(),
        session_store: state.session_store.clone(),
        entry_agent: state.registry.entry_agent().to_string(),
        passthrough_connector: None,
    };

    let handler = match MediaHandler::attach(config, deps, receiver, sender).await {
        Ok(handler) => Arc::new(handler),
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to attach media handler");
            return;
        }
    };

    if let Err(e) = state.session_manager.register(handler.clone()) {
        tracing::warn!(session_id = %session_id, error = %e, "session manager rejected attach");
        handler.detach(DetachReason::Error).await;
        return;
    }

    // The lane tasks spawned by `attach` own the socket halves; this task
    // just keeps the upgrade future alive until they've driven the
    // session to `Closing`; the periodic sweep in `SessionManager`
    // guards against a handler whose tasks exit without flipping that
    // flag (it matches on fatal errors from the recognizer/session store).
    while handler.state() != voice_media::MediaState::Closing {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    state.session_manager.detach(&session_id, DetachReason::SocketClosed).await;
}
