//! Entry point: loads layered settings and the agent roster, wires the
//! `SessionStore`/`RecognizerPool`/`SynthesizerPool`/`AgentRegistry`/
//! `Orchestrator` stack, and serves the media-stream and call-lifecycle
//! surfaces (spec §6), grounded in the reference server's `main.rs`
//! config-load/tracing-init/graceful-shutdown shape.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_rt::{AgentRegistryBuilder, Orchestrator, OrchestratorConfig};
use voice_config::{load_agent_roster, load_settings, Settings};
use voice_media::{SessionManager, SynthesizingPhraseSpeaker};
use voice_session::{InMemorySessionStore, SessionStore};
use voice_speech::{RecognizerConfig, RecognizerPool, StubRecognizerBackend, StubSynthesizerBackend, SynthesizerPool, VoiceProfile};

use voice_media_server::demo_handler::DemoAgentHandler;
use voice_media_server::{create_router, metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("VOICE_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice-media-server");

    let metrics_handle = metrics::init_metrics();

    let roster = load_agent_roster(&settings.agents_dir, settings.session.entry_agent.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, dir = %settings.agents_dir, "no agent roster found, starting with a single demo agent");
            default_roster()
        });

    let recognizer_pool = Arc::new(RecognizerPool::new(
        settings.speech.recognizer_pool_size,
        Duration::from_secs(5),
        Arc::new(|config: &RecognizerConfig| {
            let lang = config.languages.first().cloned().unwrap_or_else(|| "en-US".to_string());
            Box::new(StubRecognizerBackend::new(lang)) as Box<dyn voice_speech::RecognizerBackend>
        }),
    ));

    let synthesizer_pool = Arc::new(SynthesizerPool::new(
        settings.speech.synthesizer_pool_size,
        Duration::from_secs(5),
        Arc::new(|| Arc::new(StubSynthesizerBackend) as Arc<dyn voice_speech::SynthesizerBackend>),
    ));

    let sample_rate = match settings.speech.streaming_mode {
        voice_config::StreamingMode::Passthrough => voice_core::audio::SampleRate::Hz24000,
        _ => voice_core::audio::SampleRate::Hz16000,
    };

    let registry = Arc::new(build_registry(&roster, &synthesizer_pool, sample_rate).unwrap_or_else(|e| {
        tracing::warn!(error = %e, entry_agent = %roster.entry_agent, "configured roster's entry agent has no handler, falling back to the default agent");
        build_registry(&default_roster(), &synthesizer_pool, sample_rate)
            .expect("default_roster's entry agent always matches its only agent")
    }));

    let speaker = Arc::new(SynthesizingPhraseSpeaker::new(registry.clone(), synthesizer_pool.clone(), sample_rate));
    let orchestrator_config = OrchestratorConfig {
        turn_deadline: Duration::from_secs(settings.session.turn_deadline_seconds),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(registry.clone(), speaker, orchestrator_config));

    let session_store: Arc<dyn SessionStore> = build_session_store(&settings).await;

    let session_manager = Arc::new(SessionManager::new(
        settings.server.max_sessions,
        Duration::from_secs(settings.server.sweep_interval_seconds),
    ));
    let _sweep_shutdown = session_manager.start_sweep_task();

    let state = AppState {
        settings: Arc::new(settings.clone()),
        registry,
        orchestrator,
        recognizer_pool,
        session_store,
        session_manager,
        holder_id: Arc::from(uuid::Uuid::new_v4().to_string()),
        metrics_handle,
        call_registry: Arc::new(voice_media_server::events::CallRegistry::new()),
    };

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

#[cfg(not(feature = "scylla-backend"))]
async fn build_session_store(_settings: &Settings) -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::with_in_memory_cold())
}

#[cfg(feature = "scylla-backend")]
async fn build_session_store(settings: &Settings) -> Arc<dyn SessionStore> {
    if let Some(contact_points) = &settings.session.scylla_contact_points {
        let config = voice_session::ScyllaSessionConfig {
            hosts: contact_points.split(',').map(str::trim).map(str::to_string).collect(),
            keyspace: settings.session.scylla_keyspace.clone(),
            ..voice_session::ScyllaSessionConfig::default()
        };
        match voice_session::ScyllaSessionStore::connect(config).await {
            Ok(store) => return Arc::new(store),
            Err(e) => tracing::warn!(error = %e, "failed to connect to ScyllaDB, falling back to in-memory session store"),
        }
    }
    Arc::new(InMemorySessionStore::with_in_memory_cold())
}

fn build_registry(
    roster: &voice_config::AgentRoster,
    synthesizer_pool: &Arc<SynthesizerPool>,
    sample_rate: voice_core::audio::SampleRate,
) -> voice_agent_rt::Result<voice_agent_rt::AgentRegistry> {
    let specialists: Vec<String> = roster.agents.iter().map(|a| a.name.clone()).collect();
    let mut builder = AgentRegistryBuilder::new();
    for spec in &roster.agents {
        let profile = VoiceProfile { name: spec.voice.name.clone(), style: spec.voice.style.clone(), rate: spec.voice.rate };
        let reply = spec.greeting.clone().unwrap_or_else(|| format!("You're speaking with {}.", spec.name));
        let handler = Arc::new(DemoAgentHandler::new(profile, synthesizer_pool.clone(), sample_rate, reply));
        builder = builder.register(spec.clone(), handler);
    }
    builder.configure(roster.entry_agent.clone(), specialists).build()
}

fn default_roster() -> voice_config::AgentRoster {
    use voice_core::agent_spec::{AgentSpec, ModelSpec, PromptsSpec, VoiceSpec};
    let spec = AgentSpec {
        name: "FrontDesk".to_string(),
        description: "Default entry agent, present when no roster is configured".to_string(),
        model: ModelSpec { deployment_id: "gpt-4o-mini".into(), temperature: 0.7, max_tokens: 512 },
        voice: VoiceSpec { name: "en-US-JennyNeural".into(), style: "neutral".into(), rate: 1.0 },
        prompts: PromptsSpec { path: "prompts/front_desk.md".into() },
        tools: vec![],
        greeting: Some("Hello, thanks for calling. How can I help?".to_string()),
        reentry_phrase: None,
    };
    voice_config::AgentRoster { agents: vec![spec.clone()], entry_agent: spec.name }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(_settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voice_media_server=info,voice_media=info,tower_http=info".into());
    let subscriber = tracing_subscriber::registry().with(env_filter);
    subscriber.with(tracing_subscriber::fmt::layer().boxed()).init();
}
