//! `MediaHandler` (spec §4.4): the three-lane concurrency engine that
//! turns one attached socket into ingress audio, turn routing, and
//! egress audio/control, plus the barge-in algorithm that ties them
//! together.
//!
//! Lanes, grounded in the reference server's per-connection task split
//! (`server::websocket::handle_socket` spawning a reader and a writer
//! task over `tokio::sync::mpsc`):
//!
//! - **ingress**: decodes inbound wire frames and feeds PCM into the
//!   recognizer.
//! - **bridge**: watches the recognizer's partial/final outputs, drives
//!   `SessionState`, detects barge-in, and hands finals to the turn lane.
//! - **turn**: owns `CoreMemory` exclusively and runs the orchestrator.
//! - **egress**: the only lane that writes to the socket; a `biased`
//!   `select!` gives a dedicated stop-audio control channel priority
//!   over the audio/transcript data channel (spec §4.4 step 4).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use voice_agent_rt::{AudioSink, Orchestrator, OrchestratorOutcome};
use voice_core::audio::{AudioFrame, SampleRate};
use voice_core::memory::{CoreMemory, HistoryEntry, HistoryPolicy, Role};
use voice_session::SessionStore;
use voice_speech::{RecognizerConfig, RecognizerPool};

use crate::error::{MediaError, Result};
use crate::passthrough::{passthrough_loop, PassthroughConnector};
use crate::state::{MediaState, SessionState};
use crate::transport::{TransportReceiver, TransportSender};
use crate::wire::{InboundFrame, OutboundFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    SocketClosed,
    Escalated,
    LeaseLost,
    Error,
}

#[derive(Debug, Clone)]
pub struct MediaHandlerConfig {
    pub session_id: String,
    pub streaming_mode: voice_config::StreamingMode,
    pub sample_rate: SampleRate,
    pub languages: Vec<String>,
    pub diarization: bool,
    pub session_ttl: Duration,
    pub lease_ttl: Duration,
    pub holder_id: String,
}

pub struct MediaHandlerDeps {
    pub recognizer_pool: Arc<RecognizerPool>,
    pub orchestrator: Arc<Orchestrator>,
    pub session_store: Arc<dyn SessionStore>,
    pub entry_agent: String,
    pub passthrough_connector: Option<Arc<dyn PassthroughConnector>>,
}

/// Frames and control items carried on the egress lane. `TurnComplete`
/// is a sentinel: the lane only moves `SessionState` to `Idle` once it
/// has actually been dequeued, so the transition tracks drained audio
/// rather than the orchestrator merely returning (spec §4.4, "Idle |
/// Enter on: egress lane reports drained").
enum EgressItem {
    Audio(AudioFrame),
    Transcript { text: String, is_final: bool },
    TurnComplete(u64),
}

/// `AudioSink` wired to a turn's egress channel. Tags every frame with
/// the turn's epoch so the egress lane can drop stale frames after a
/// barge-in bumps the shared counter (spec §4.4 step 7).
struct EgressSink {
    tx: mpsc::Sender<EgressItem>,
    turn_epoch: u64,
    state: Arc<SessionState>,
    speaking: AtomicBool,
}

#[async_trait]
impl AudioSink for EgressSink {
    async fn enqueue(&self, frame: AudioFrame) {
        if !self.speaking.swap(true, Ordering::SeqCst) {
            self.state.transition_to(MediaState::Speaking);
        }
        let _ = self.tx.send(EgressItem::Audio(frame)).await;
    }
}

/// A live attachment between one socket and one session. Dropping or
/// calling `detach` aborts all lane tasks.
pub struct MediaHandler {
    session_id: String,
    state: Arc<SessionState>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl MediaHandler {
    /// Rehydrates (or creates) `CoreMemory`, acquires the session's
    /// write lease, and spawns the lane tasks for `config.streaming_mode`
    /// (spec §4.4 "selection is per-call, at accept time").
    pub async fn attach(
        config: MediaHandlerConfig,
        deps: MediaHandlerDeps,
        receiver: Box<dyn TransportReceiver>,
        sender: Box<dyn TransportSender>,
    ) -> Result<Self> {
        // Newer wins (spec §2): this always takes the lease, even if it
        // was held by someone else. `lease_lost` fires on this handler
        // the next time a later attach steals it back, which is how the
        // older side of a conflict learns to tear itself down.
        let lease_lost = deps
            .session_store
            .acquire_lease(&config.session_id, &config.holder_id, config.lease_ttl)
            .await?;

        let memory = match deps.session_store.load(&config.session_id).await {
            Ok(memory) => memory,
            Err(_) => CoreMemory::new(config.session_id.clone(), deps.entry_agent.clone()),
        };

        let state = Arc::new(SessionState::new());
        let mut tasks = Vec::new();

        match config.streaming_mode {
            voice_config::StreamingMode::SttTts => {
                tasks.extend(Self::spawn_stt_tts(&config, deps, receiver, sender, memory, state.clone(), lease_lost).await?);
            }
            voice_config::StreamingMode::TranscriptionOnly => {
                tasks.extend(Self::spawn_transcription_only(&config, deps, receiver, sender, memory, state.clone(), lease_lost).await?);
            }
            voice_config::StreamingMode::Passthrough => {
                tasks.extend(Self::spawn_passthrough(&config, deps, receiver, sender, state.clone(), lease_lost).await?);
            }
        }

        Ok(Self { session_id: config.session_id, state, tasks: SyncMutex::new(tasks) })
    }

    pub fn state(&self) -> MediaState {
        self.state.current()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Idempotent. Aborts every lane task; the lease is released by
    /// whichever lane observes the socket close (the bridge task, for
    /// STT_TTS and TRANSCRIPTION_ONLY; the passthrough task otherwise).
    /// When `reason` is `LeaseLost` the lease already belongs to whoever
    /// stole it, so the lanes skip releasing it on the way out.
    pub async fn detach(&self, reason: DetachReason) {
        self.state.transition_to(MediaState::Closing);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.abort();
        }
        tracing::info!(session_id = %self.session_id, ?reason, "media handler detached");
    }

    async fn spawn_stt_tts(
        config: &MediaHandlerConfig,
        deps: MediaHandlerDeps,
        receiver: Box<dyn TransportReceiver>,
        sender: Box<dyn TransportSender>,
        memory: CoreMemory,
        state: Arc<SessionState>,
        lease_lost: Arc<Notify>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let recognizer_config = RecognizerConfig { languages: config.languages.clone(), diarization: config.diarization };
        let recognizer = Arc::new(deps.recognizer_pool.acquire(&recognizer_config).await?);

        let (data_tx, data_rx) = mpsc::channel::<EgressItem>(64);
        let (control_tx, control_rx) = mpsc::channel::<()>(4);
        let (turn_tx, turn_rx) = mpsc::channel::<(String, String, u64)>(8);
        let turn_epoch = Arc::new(AtomicU64::new(0));
        let cancel_notify = Arc::new(Notify::new());

        let ingress = tokio::spawn(ingress_loop(
            receiver,
            recognizer.clone(),
            config.sample_rate,
            config.session_id.clone(),
        ));

        let bridge = tokio::spawn(bridge_loop(
            recognizer,
            state.clone(),
            turn_tx,
            turn_epoch.clone(),
            control_tx,
            cancel_notify.clone(),
            config.session_id.clone(),
            deps.session_store.clone(),
            config.holder_id.clone(),
            lease_lost,
        ));

        let turn = tokio::spawn(turn_loop(
            config.session_id.clone(),
            turn_rx,
            deps.orchestrator.clone(),
            deps.session_store.clone(),
            config.session_ttl,
            data_tx,
            state.clone(),
            cancel_notify.clone(),
            memory,
        ));

        let egress = tokio::spawn(egress_loop(sender, data_rx, control_rx, turn_epoch, state));

        Ok(vec![ingress, bridge, turn, egress])
    }

    async fn spawn_transcription_only(
        config: &MediaHandlerConfig,
        deps: MediaHandlerDeps,
        receiver: Box<dyn TransportReceiver>,
        sender: Box<dyn TransportSender>,
        memory: CoreMemory,
        state: Arc<SessionState>,
        lease_lost: Arc<Notify>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let recognizer_config = RecognizerConfig { languages: config.languages.clone(), diarization: config.diarization };
        let recognizer = Arc::new(deps.recognizer_pool.acquire(&recognizer_config).await?);

        let (data_tx, data_rx) = mpsc::channel::<EgressItem>(64);
        let (control_tx, control_rx) = mpsc::channel::<()>(1);
        let turn_epoch = Arc::new(AtomicU64::new(0));

        let ingress = tokio::spawn(ingress_loop(
            receiver,
            recognizer.clone(),
            config.sample_rate,
            config.session_id.clone(),
        ));

        let transcribe = tokio::spawn(transcription_only_loop(
            recognizer,
            state.clone(),
            data_tx,
            deps.session_store.clone(),
            config.session_id.clone(),
            config.session_ttl,
            memory,
            config.holder_id.clone(),
            lease_lost,
        ));

        let egress = tokio::spawn(egress_loop(sender, data_rx, control_rx, turn_epoch, state));

        Ok(vec![ingress, transcribe, egress])
    }

    async fn spawn_passthrough(
        config: &MediaHandlerConfig,
        deps: MediaHandlerDeps,
        receiver: Box<dyn TransportReceiver>,
        sender: Box<dyn TransportSender>,
        state: Arc<SessionState>,
        lease_lost: Arc<Notify>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let connector = deps
            .passthrough_connector
            .clone()
            .ok_or_else(|| MediaError::TransportSend("no passthrough connector configured".into()))?;

        Ok(vec![tokio::spawn(passthrough_loop(
            receiver,
            sender,
            connector,
            state,
            config.session_id.clone(),
            config.sample_rate,
            deps.session_store.clone(),
            config.holder_id.clone(),
            lease_lost,
        ))])
    }
}

async fn ingress_loop(
    mut receiver: Box<dyn TransportReceiver>,
    recognizer: Arc<voice_speech::PooledRecognizer>,
    sample_rate: SampleRate,
    session_id: String,
) {
    while let Some(text) = receiver.recv().await {
        match InboundFrame::parse(&text) {
            Ok(InboundFrame::AudioMetadata { audio_metadata }) => {
                tracing::debug!(session_id = %session_id, rate = audio_metadata.sample_rate, "audio metadata received");
            }
            Ok(InboundFrame::AudioData { audio_data }) => {
                if audio_data.silent {
                    continue;
                }
                match BASE64.decode(audio_data.data.as_bytes()) {
                    Ok(bytes) => {
                        let frame = AudioFrame::from_pcm_bytes(&bytes, sample_rate, 0);
                        recognizer.feed(frame);
                    }
                    Err(e) => tracing::warn!(session_id = %session_id, error = %e, "dropping non-base64 audio frame"),
                }
            }
            Ok(InboundFrame::StopAudio { .. }) => {
                tracing::debug!(session_id = %session_id, "peer acknowledged stop-audio");
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "dropping malformed inbound frame");
            }
        }
    }
    tracing::debug!(session_id = %session_id, "ingress lane observed socket close");
}

/// Watches the recognizer's partial/final outputs, drives `SessionState`,
/// and detects barge-in: a partial arriving while `Speaking` or `Turning`
/// means the caller spoke over the agent (spec §4.4 steps 1-4). Also
/// watches `lease_lost`, which fires when a newer `MediaHandler` steals
/// this session's write lease out from under it (spec §2); on that signal
/// this lane tears down without releasing the lease, since it no longer
/// owns it.
#[allow(clippy::too_many_arguments)]
async fn bridge_loop(
    recognizer: Arc<voice_speech::PooledRecognizer>,
    state: Arc<SessionState>,
    turn_tx: mpsc::Sender<(String, String, u64)>,
    turn_epoch: Arc<AtomicU64>,
    control_tx: mpsc::Sender<()>,
    cancel_notify: Arc<Notify>,
    session_id: String,
    session_store: Arc<dyn SessionStore>,
    holder_id: String,
    lease_lost: Arc<Notify>,
) {
    let mut partial_rx = recognizer.subscribe_partial();
    let mut superseded = false;
    loop {
        tokio::select! {
            _ = lease_lost.notified() => {
                tracing::info!(session_id = %session_id, reason = ?DetachReason::LeaseLost, "session lease stolen by a newer handler");
                superseded = true;
                break;
            }
            changed = partial_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let partial = partial_rx.borrow_and_update().clone();
                let Some(partial) = partial else { continue };
                match state.current() {
                    MediaState::Speaking | MediaState::Turning => {
                        state.transition_to(MediaState::BargingIn);
                        let started = Instant::now();
                        let _ = control_tx.send(()).await;
                        metrics::histogram!("voice_media_barge_in_stop_latency_ms")
                            .record(started.elapsed().as_secs_f64() * 1000.0);
                        turn_epoch.fetch_add(1, Ordering::SeqCst);
                        cancel_notify.notify_waiters();
                        state.transition_to(MediaState::Listening);
                    }
                    MediaState::Idle => state.transition_to(MediaState::Listening),
                    _ => {}
                }
                tracing::trace!(session_id = %session_id, text = %partial.text, "partial transcript");
            }
            final_transcript = recognizer.next_final() => {
                state.transition_to(MediaState::Turning);
                let epoch = turn_epoch.fetch_add(1, Ordering::SeqCst) + 1;
                if turn_tx.send((final_transcript.text, final_transcript.lang, epoch)).await.is_err() {
                    break;
                }
            }
        }
    }
    if !superseded {
        session_store.release_lease(&session_id, &holder_id).await;
    }
    state.transition_to(MediaState::Closing);
}

/// Owns `CoreMemory` exclusively for the life of the session (spec §9:
/// "an actor-like per-session task... no shared mutex"). Races the
/// orchestrator call against a barge-in cancellation signal so a
/// superseded turn stops contributing audio promptly; the turn's epoch
/// was already bumped by the bridge task, so any frames it already
/// enqueued are discarded downstream regardless.
#[allow(clippy::too_many_arguments)]
async fn turn_loop(
    session_id: String,
    mut turn_rx: mpsc::Receiver<(String, String, u64)>,
    orchestrator: Arc<Orchestrator>,
    session_store: Arc<dyn SessionStore>,
    session_ttl: Duration,
    egress_tx: mpsc::Sender<EgressItem>,
    state: Arc<SessionState>,
    cancel_notify: Arc<Notify>,
    mut memory: CoreMemory,
) {
    let history_policy = HistoryPolicy::default();
    while let Some((text, _lang, epoch)) = turn_rx.recv().await {
        if text.trim().is_empty() {
            state.transition_to(MediaState::Idle);
            continue;
        }
        memory.append_history(HistoryEntry::new(memory.active_agent.clone(), Role::User, text.clone(), epoch), history_policy);

        let sink = EgressSink {
            tx: egress_tx.clone(),
            turn_epoch: epoch,
            state: state.clone(),
            speaking: AtomicBool::new(false),
        };
        let cancelled = cancel_notify.notified();
        tokio::pin!(cancelled);

        tokio::select! {
            biased;
            _ = &mut cancelled => {
                tracing::debug!(session_id = %session_id, epoch, "turn cancelled by barge-in");
                continue;
            }
            outcome = orchestrator.route(&mut memory, &text, &sink, false, epoch) => {
                let _ = egress_tx.send(EgressItem::TurnComplete(epoch)).await;
                if let Err(e) = session_store.save(memory.session_id(), &memory, session_ttl).await {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to persist session after turn");
                }
                if let OrchestratorOutcome::Escalate { .. } = outcome {
                    let _ = session_store.archive(memory.session_id()).await;
                    state.transition_to(MediaState::Closing);
                    break;
                }
            }
        }
    }
}

/// The `TRANSCRIPTION_ONLY` variant (spec §4.4): recognizer runs, finals
/// are written to history and surfaced as transcript events, but the
/// orchestrator and synthesizer are never invoked.
#[allow(clippy::too_many_arguments)]
async fn transcription_only_loop(
    recognizer: Arc<voice_speech::PooledRecognizer>,
    state: Arc<SessionState>,
    egress_tx: mpsc::Sender<EgressItem>,
    session_store: Arc<dyn SessionStore>,
    session_id: String,
    session_ttl: Duration,
    mut memory: CoreMemory,
    holder_id: String,
    lease_lost: Arc<Notify>,
) {
    let mut partial_rx = recognizer.subscribe_partial();
    let history_policy = HistoryPolicy::default();
    let mut epoch: u64 = 0;
    let mut superseded = false;
    loop {
        tokio::select! {
            _ = lease_lost.notified() => {
                tracing::info!(session_id = %session_id, reason = ?DetachReason::LeaseLost, "session lease stolen by a newer handler");
                superseded = true;
                break;
            }
            changed = partial_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let partial = partial_rx.borrow_and_update().clone();
                if let Some(partial) = partial {
                    state.transition_to(MediaState::Listening);
                    let _ = egress_tx.send(EgressItem::Transcript { text: partial.text, is_final: false }).await;
                }
            }
            final_transcript = recognizer.next_final() => {
                epoch += 1;
                memory.append_history(
                    HistoryEntry::new(memory.active_agent.clone(), Role::User, final_transcript.text.clone(), epoch),
                    history_policy,
                );
                if let Err(e) = session_store.save(memory.session_id(), &memory, session_ttl).await {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to persist transcription-only session");
                }
                let _ = egress_tx.send(EgressItem::Transcript { text: final_transcript.text, is_final: true }).await;
                state.transition_to(MediaState::Idle);
            }
        }
    }
    if !superseded {
        session_store.release_lease(&session_id, &holder_id).await;
    }
    state.transition_to(MediaState::Closing);
}

/// The only lane that writes to the socket. A `biased` select gives the
/// dedicated stop-audio control channel priority over queued data, so a
/// stop-audio frame is never stuck behind already-buffered audio (spec
/// §4.4 step 4, invariant: "stop-audio is observable by the peer before
/// any further agent audio for the superseded turn").
async fn egress_loop(
    mut sender: Box<dyn TransportSender>,
    mut data_rx: mpsc::Receiver<EgressItem>,
    mut control_rx: mpsc::Receiver<()>,
    current_epoch: Arc<AtomicU64>,
    state: Arc<SessionState>,
) {
    loop {
        tokio::select! {
            biased;
            Some(()) = control_rx.recv() => {
                if let Err(e) = sender.send_text(OutboundFrame::stop_audio().to_json()).await {
                    tracing::warn!(error = %e, "failed to send stop-audio frame");
                    break;
                }
            }
            item = data_rx.recv() => {
                match item {
                    Some(EgressItem::Audio(frame)) => {
                        if frame.turn_epoch != current_epoch.load(Ordering::SeqCst) {
                            tracing::debug!(epoch = frame.turn_epoch, "discarding stale egress frame");
                            continue;
                        }
                        let encoded = BASE64.encode(frame.to_pcm_bytes());
                        if let Err(e) = sender.send_text(OutboundFrame::audio(encoded).to_json()).await {
                            tracing::warn!(error = %e, "failed to send audio frame");
                            break;
                        }
                    }
                    Some(EgressItem::Transcript { text, is_final }) => {
                        let _ = sender.send_text(OutboundFrame::transcript(text, is_final).to_json()).await;
                    }
                    Some(EgressItem::TurnComplete(epoch)) => {
                        if epoch == current_epoch.load(Ordering::SeqCst) {
                            state.transition_to(MediaState::Idle);
                        }
                    }
                    None => break,
                }
            }
            else => break,
        }
    }
    sender.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as TestAtomicU64;
    use tokio::sync::Mutex as AsyncMutex;

    struct ChannelReceiver {
        rx: mpsc::Receiver<String>,
    }

    #[async_trait]
    impl TransportReceiver for ChannelReceiver {
        async fn recv(&mut self) -> Option<String> {
            self.rx.recv().await
        }
    }

    struct RecordingSender {
        sent: Arc<AsyncMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TransportSender for RecordingSender {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.sent.lock().await.push(text);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn egress_drops_frames_from_a_superseded_epoch() {
        let (data_tx, data_rx) = mpsc::channel(8);
        let (_control_tx, control_rx) = mpsc::channel(1);
        let epoch = Arc::new(TestAtomicU64::new(2));
        let state = Arc::new(SessionState::new());
        let sent = Arc::new(AsyncMutex::new(Vec::new()));
        let sender = Box::new(RecordingSender { sent: sent.clone() });

        let handle = tokio::spawn(egress_loop(sender, data_rx, control_rx, epoch, state));

        data_tx
            .send(EgressItem::Audio(AudioFrame::new(vec![1, 2, 3], SampleRate::Hz16000, voice_core::Channels::Mono, 0, 1)))
            .await
            .unwrap();
        data_tx
            .send(EgressItem::Audio(AudioFrame::new(vec![4, 5, 6], SampleRate::Hz16000, voice_core::Channels::Mono, 1, 2)))
            .await
            .unwrap();
        drop(data_tx);
        handle.await.unwrap();

        let sent = sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("AudioData"));
    }

    #[tokio::test]
    async fn egress_turn_complete_sets_idle_only_for_current_epoch() {
        let (data_tx, data_rx) = mpsc::channel(8);
        let (_control_tx, control_rx) = mpsc::channel(1);
        let epoch = Arc::new(TestAtomicU64::new(5));
        let state = Arc::new(SessionState::new());
        state.transition_to(MediaState::Turning);
        let sender = Box::new(RecordingSender { sent: Arc::new(AsyncMutex::new(Vec::new())) });

        let handle = tokio::spawn(egress_loop(sender, data_rx, control_rx, epoch.clone(), state.clone()));

        data_tx.send(EgressItem::TurnComplete(3)).await.unwrap();
        data_tx.send(EgressItem::TurnComplete(5)).await.unwrap();
        drop(data_tx);
        handle.await.unwrap();

        assert_eq!(state.current(), MediaState::Idle);
    }

    #[allow(dead_code)]
    fn channel_receiver(rx: mpsc::Receiver<String>) -> Box<dyn TransportReceiver> {
        Box::new(ChannelReceiver { rx })
    }
}
