//! Integration tests driving `MediaHandler::attach` end to end through a
//! fake `Transport` and a scripted recognizer backend, covering the
//! single-turn, barge-in, and reconnect scenarios of spec §8.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use voice_agent_rt::{AgentRegistryBuilder, AgentHandler, AudioSink, Orchestrator, OrchestratorConfig};
use voice_config::StreamingMode;
use voice_core::agent_spec::{AgentSpec, ModelSpec, PromptsSpec, VoiceSpec};
use voice_core::audio::{AudioFrame, Channels, SampleRate};
use voice_core::memory::{CoreMemory, ToolEnvelope};
use voice_session::{InMemorySessionStore, SessionStore};
use voice_speech::{
    BackendFactory, FinalTranscript, PartialTranscript, RecognitionEvent, RecognizerBackend,
    RecognizerConfig, RecognizerPool, StubSynthesizerBackend, SynthesizerBackend, SynthesizerBackendFactory,
    SynthesizerPool,
};

use voice_media::transport::{TransportReceiver, TransportSender};
use voice_media::{MediaHandler, MediaHandlerConfig, MediaHandlerDeps, SynthesizingPhraseSpeaker};

struct ChanReceiver {
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl TransportReceiver for ChanReceiver {
    async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

struct RecordingSender {
    sent: Arc<AsyncMutex<Vec<String>>>,
}

#[async_trait]
impl TransportSender for RecordingSender {
    async fn send_text(&mut self, text: String) -> voice_media::Result<()> {
        self.sent.lock().await.push(text);
        Ok(())
    }

    async fn close(&mut self) {}
}

/// A recognizer backend driven by one-sample "command" frames instead of
/// real energy thresholds, so tests can deterministically place a final
/// or a partial at an exact point in the lane pipeline.
struct ScriptedBackend;

impl RecognizerBackend for ScriptedBackend {
    fn feed(&mut self, frame: &AudioFrame) -> Vec<RecognitionEvent> {
        match frame.samples.first().copied() {
            Some(2) => vec![RecognitionEvent::Final(FinalTranscript { text: "turn one".into(), lang: "en-US".into() })],
            Some(9) => vec![RecognitionEvent::Partial(PartialTranscript { text: "interrupt".into(), lang: "en-US".into(), speaker: None })],
            _ => vec![],
        }
    }

    fn flush(&mut self) -> Option<FinalTranscript> {
        None
    }

    fn reset(&mut self) {}
}

fn scripted_factory() -> BackendFactory {
    Arc::new(|_cfg: &RecognizerConfig| Box::new(ScriptedBackend) as Box<dyn RecognizerBackend>)
}

fn synth_factory() -> SynthesizerBackendFactory {
    Arc::new(|| Arc::new(StubSynthesizerBackend) as Arc<dyn SynthesizerBackend>)
}

fn command_frame_json(command: i16) -> String {
    let encoded = BASE64.encode(command.to_le_bytes());
    format!(r#"{{"kind":"AudioData","audioData":{{"data":"{encoded}","silent":false}}}}"#)
}

fn agent_spec(name: &str) -> AgentSpec {
    AgentSpec {
        name: name.to_string(),
        description: String::new(),
        model: ModelSpec { deployment_id: "gpt-4o-mini".into(), temperature: 0.7, max_tokens: 256 },
        voice: VoiceSpec { name: format!("{name}-voice"), style: "neutral".into(), rate: 1.0 },
        prompts: PromptsSpec { path: format!("prompts/{name}.md") },
        tools: vec![],
        greeting: None,
        reentry_phrase: None,
    }
}

/// Enqueues one frame immediately, waits `delay`, then enqueues a second
/// frame; records its own name into `log` so reconnect tests can see
/// which agent actually served a turn.
struct SlowEchoHandler {
    name: &'static str,
    delay: Duration,
    log: Arc<AsyncMutex<Vec<String>>>,
}

#[async_trait]
impl AgentHandler for SlowEchoHandler {
    async fn respond(
        &self,
        _memory: &mut CoreMemory,
        _utterance: &str,
        sink: &dyn AudioSink,
        _is_provider_call: bool,
        turn_epoch: u64,
    ) -> ToolEnvelope {
        self.log.lock().await.push(self.name.to_string());
        sink.enqueue(AudioFrame::new(vec![1000; 80], SampleRate::Hz16000, Channels::Mono, 0, turn_epoch)).await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        sink.enqueue(AudioFrame::new(vec![2000; 80], SampleRate::Hz16000, Channels::Mono, 1, turn_epoch)).await;
        ToolEnvelope::ok("done")
    }
}

fn test_config(session_id: &str) -> MediaHandlerConfig {
    MediaHandlerConfig {
        session_id: session_id.to_string(),
        streaming_mode: StreamingMode::SttTts,
        sample_rate: SampleRate::Hz16000,
        languages: vec!["en-US".to_string()],
        diarization: false,
        session_ttl: Duration::from_secs(30),
        lease_ttl: Duration::from_secs(30),
        holder_id: "holder-1".to_string(),
    }
}

fn count_matches(sent: &[String], needle: &str) -> usize {
    sent.iter().filter(|s| s.contains(needle)).count()
}

const KIND_AUDIO_DATA: &str = "\"Kind\":\"AudioData\"";
const KIND_STOP_AUDIO: &str = "\"Kind\":\"StopAudio\"";

#[tokio::test]
async fn scenario_a_basic_single_turn_emits_audio_and_persists_history() {
    let log = Arc::new(AsyncMutex::new(Vec::new()));
    let registry = Arc::new(
        AgentRegistryBuilder::new()
            .register(agent_spec("Agent"), Arc::new(SlowEchoHandler { name: "Agent", delay: Duration::ZERO, log: log.clone() }))
            .configure("Agent", vec![])
            .build(),
    );
    let synthesizer_pool = Arc::new(SynthesizerPool::new(2, Duration::from_secs(1), synth_factory()));
    let speaker = Arc::new(SynthesizingPhraseSpeaker::new(registry.clone(), synthesizer_pool, SampleRate::Hz16000));
    let orchestrator = Arc::new(Orchestrator::new(registry, speaker, OrchestratorConfig::default()));
    let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::with_in_memory_cold());
    let recognizer_pool = Arc::new(RecognizerPool::new(2, Duration::from_secs(1), scripted_factory()));

    let deps = MediaHandlerDeps {
        recognizer_pool,
        orchestrator,
        session_store: session_store.clone(),
        entry_agent: "Agent".to_string(),
        passthrough_connector: None,
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let sent = Arc::new(AsyncMutex::new(Vec::new()));
    let receiver = Box::new(ChanReceiver { rx: inbound_rx });
    let sender = Box::new(RecordingSender { sent: sent.clone() });

    let handler = MediaHandler::attach(test_config("session-a"), deps, receiver, sender).await.unwrap();

    inbound_tx.send(command_frame_json(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sent = sent.lock().await;
    assert_eq!(count_matches(&sent, KIND_AUDIO_DATA), 2, "both response frames should reach the socket");
    assert!(log.lock().await.contains(&"Agent".to_string()));

    let persisted = session_store.load("session-a").await.unwrap();
    assert!(persisted.history.iter().any(|e| e.content == "turn one"));
    drop(handler);
}

#[tokio::test]
async fn scenario_b_barge_in_stops_audio_and_discards_the_superseded_turn() {
    let log = Arc::new(AsyncMutex::new(Vec::new()));
    let registry = Arc::new(
        AgentRegistryBuilder::new()
            .register(
                agent_spec("Agent"),
                Arc::new(SlowEchoHandler { name: "Agent", delay: Duration::from_millis(250), log: log.clone() }),
            )
            .configure("Agent", vec![])
            .build(),
    );
    let synthesizer_pool = Arc::new(SynthesizerPool::new(2, Duration::from_secs(1), synth_factory()));
    let speaker = Arc::new(SynthesizingPhraseSpeaker::new(registry.clone(), synthesizer_pool, SampleRate::Hz16000));
    let orchestrator = Arc::new(Orchestrator::new(registry, speaker, OrchestratorConfig::default()));
    let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::with_in_memory_cold());
    let recognizer_pool = Arc::new(RecognizerPool::new(2, Duration::from_secs(1), scripted_factory()));

    let deps = MediaHandlerDeps {
        recognizer_pool,
        orchestrator,
        session_store,
        entry_agent: "Agent".to_string(),
        passthrough_connector: None,
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let sent = Arc::new(AsyncMutex::new(Vec::new()));
    let receiver = Box::new(ChanReceiver { rx: inbound_rx });
    let sender = Box::new(RecordingSender { sent: sent.clone() });

    let handler = MediaHandler::attach(test_config("session-b"), deps, receiver, sender).await.unwrap();

    inbound_tx.send(command_frame_json(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    inbound_tx.send(command_frame_json(9)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let sent = sent.lock().await;
    assert_eq!(count_matches(&sent, KIND_STOP_AUDIO), 1, "barge-in must emit exactly one stop-audio frame");
    assert_eq!(count_matches(&sent, KIND_AUDIO_DATA), 1, "the turn's second frame must never reach the socket once cancelled");

    let stop_index = sent.iter().position(|s| s.contains(KIND_STOP_AUDIO)).unwrap();
    let audio_index = sent.iter().position(|s| s.contains(KIND_AUDIO_DATA)).unwrap();
    assert!(audio_index < stop_index, "the first frame must precede the stop-audio control frame");
    drop(handler);
}

#[tokio::test]
async fn scenario_d_reconnect_rehydrates_the_active_agent() {
    let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::with_in_memory_cold());
    let mut seeded = CoreMemory::new("session-d", "Entry");
    seeded.active_agent = "Specialist".to_string();
    session_store.save("session-d", &seeded, Duration::from_secs(60)).await.unwrap();

    let log = Arc::new(AsyncMutex::new(Vec::new()));
    let registry = Arc::new(
        AgentRegistryBuilder::new()
            .register(agent_spec("Entry"), Arc::new(SlowEchoHandler { name: "Entry", delay: Duration::ZERO, log: log.clone() }))
            .register(agent_spec("Specialist"), Arc::new(SlowEchoHandler { name: "Specialist", delay: Duration::ZERO, log: log.clone() }))
            .configure("Entry", vec!["Specialist".to_string()])
            .build(),
    );
    let synthesizer_pool = Arc::new(SynthesizerPool::new(2, Duration::from_secs(1), synth_factory()));
    let speaker = Arc::new(SynthesizingPhraseSpeaker::new(registry.clone(), synthesizer_pool, SampleRate::Hz16000));
    let orchestrator = Arc::new(Orchestrator::new(registry, speaker, OrchestratorConfig::default()));
    let recognizer_pool = Arc::new(RecognizerPool::new(2, Duration::from_secs(1), scripted_factory()));

    let deps = MediaHandlerDeps {
        recognizer_pool,
        orchestrator,
        session_store: session_store.clone(),
        entry_agent: "Entry".to_string(),
        passthrough_connector: None,
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let sent = Arc::new(AsyncMutex::new(Vec::new()));
    let receiver = Box::new(ChanReceiver { rx: inbound_rx });
    let sender = Box::new(RecordingSender { sent: sent.clone() });

    let handler = MediaHandler::attach(test_config("session-d"), deps, receiver, sender).await.unwrap();

    inbound_tx.send(command_frame_json(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(&*log.lock().await, &vec!["Specialist".to_string()], "the turn must be served by the rehydrated active agent, not the entry agent");
    drop(handler);
}
