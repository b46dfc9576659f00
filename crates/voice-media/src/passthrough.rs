//! The `PASSTHROUGH` streaming variant (spec §4.4): the recognizer,
//! synthesizer, and orchestrator are bypassed entirely; audio is bridged
//! between the attached socket and an external realtime voice service.
//! The egress lane's framing and the stop-audio protocol are retained so
//! the peer sees the same wire shapes regardless of variant.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::{mpsc, Notify};
use voice_session::SessionStore;

use voice_core::audio::{AudioFrame, SampleRate};

use crate::handler::DetachReason;
use crate::state::{MediaState, SessionState};
use crate::transport::{TransportReceiver, TransportSender};
use crate::wire::{InboundFrame, OutboundFrame};

/// Abstracts the provider-specific realtime connection a passthrough
/// call is bridged to. A production implementation wraps that provider's
/// own streaming client; tests use `EchoConnector` below.
#[async_trait]
pub trait PassthroughConnector: Send + Sync {
    async fn send_audio(&self, frame: AudioFrame);

    /// Pulls the next frame the external service wants played to the
    /// caller, or `None` once the external connection has closed.
    async fn recv_audio(&self) -> Option<AudioFrame>;
}

/// Bridges one attached socket to `connector` until either side closes.
/// Runs ingress decode and egress re-encode inline on the same task since
/// there is no recognizer/orchestrator/synthesizer concurrency to isolate
/// here (spec §4.4: "this core's recognizer/synthesizer/orchestrator are
/// bypassed"). Also watches `lease_lost` (spec §2: "the newer
/// `MediaHandler` wins and the older must tear down") so a preempted
/// passthrough session closes instead of forwarding audio forever.
#[allow(clippy::too_many_arguments)]
pub async fn passthrough_loop(
    mut receiver: Box<dyn TransportReceiver>,
    sender: Box<dyn TransportSender>,
    connector: Arc<dyn PassthroughConnector>,
    state: Arc<SessionState>,
    session_id: String,
    sample_rate: SampleRate,
    session_store: Arc<dyn SessionStore>,
    holder_id: String,
    lease_lost: Arc<Notify>,
) {
    state.transition_to(MediaState::Listening);
    let sender = Arc::new(tokio::sync::Mutex::new(sender));

    let forward_connector = connector.clone();
    let forward_sender = sender.clone();
    let forward_state = state.clone();
    let forward_session_id = session_id.clone();
    let forward = tokio::spawn(async move {
        while let Some(frame) = forward_connector.recv_audio().await {
            forward_state.transition_to(MediaState::Speaking);
            let encoded = BASE64.encode(frame.to_pcm_bytes());
            let mut sender = forward_sender.lock().await;
            if let Err(e) = sender.send_text(OutboundFrame::audio(encoded).to_json()).await {
                tracing::warn!(session_id = %forward_session_id, error = %e, "failed to forward passthrough audio");
                break;
            }
        }
    });

    let mut superseded = false;
    loop {
        tokio::select! {
            _ = lease_lost.notified() => {
                tracing::info!(session_id = %session_id, reason = ?DetachReason::LeaseLost, "session lease stolen by a newer handler");
                superseded = true;
                break;
            }
            text = receiver.recv() => {
                let Some(text) = text else { break };
                match InboundFrame::parse(&text) {
                    Ok(InboundFrame::AudioData { audio_data }) if !audio_data.silent => {
                        match BASE64.decode(audio_data.data.as_bytes()) {
                            Ok(bytes) => connector.send_audio(AudioFrame::from_pcm_bytes(&bytes, sample_rate, 0)).await,
                            Err(e) => tracing::warn!(session_id = %session_id, error = %e, "dropping non-base64 passthrough frame"),
                        }
                    }
                    Ok(InboundFrame::StopAudio { .. }) => {
                        let mut sender = sender.lock().await;
                        let _ = sender.send_text(OutboundFrame::stop_audio().to_json()).await;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(session_id = %session_id, error = %e, "dropping malformed passthrough frame"),
                }
            }
        }
    }

    forward.abort();
    if !superseded {
        session_store.release_lease(&session_id, &holder_id).await;
    }
    state.transition_to(MediaState::Closing);
    sender.lock().await.close().await;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// Echoes every sent frame back out through `recv_audio`, for tests
    /// that only need to exercise the bridging plumbing.
    #[derive(Default)]
    pub struct EchoConnector {
        inbox: Mutex<std::collections::VecDeque<AudioFrame>>,
    }

    #[async_trait]
    impl PassthroughConnector for EchoConnector {
        async fn send_audio(&self, frame: AudioFrame) {
            self.inbox.lock().await.push_back(frame);
        }

        async fn recv_audio(&self) -> Option<AudioFrame> {
            loop {
                if let Some(frame) = self.inbox.lock().await.pop_front() {
                    return Some(frame);
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
    }
}
