//! The Orchestrator (spec §4.5): per-turn routing between specialists,
//! handoff/escalation interpretation, and the fixed set of synthesized
//! system phrases (greeting, re-entry, apology, escalation).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use voice_core::memory::{CoreMemory, Handoff, HistoryEntry, HistoryPolicy, Role, ToolEnvelope};

use crate::handler::AudioSink;
use crate::registry::AgentRegistry;

/// Converts a fixed system phrase into synthesized audio on the standard
/// egress path (spec §4.5: "Greeting emission uses the standard egress
/// path"). Implemented by `voice-media`, which owns the `SynthesizerPool`;
/// kept as a trait here so the orchestrator stays decoupled from SpeechIO.
#[async_trait]
pub trait PhraseSpeaker: Send + Sync {
    async fn speak(&self, agent_name: &str, text: &str, turn_epoch: u64, sink: &dyn AudioSink);
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub turn_deadline: Duration,
    pub apology_phrase: String,
    pub escalation_phrase: String,
    pub history_policy: HistoryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_deadline: Duration::from_secs(30),
            apology_phrase: "I'm sorry, something went wrong on my end. Could you repeat that?".into(),
            escalation_phrase: "Let me connect you with a specialist who can help further.".into(),
            history_policy: HistoryPolicy::default(),
        }
    }
}

/// What the turn lane should do next, once the orchestrator has finished
/// routing this turn (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorOutcome {
    /// Turn complete; remain on the call.
    Continue,
    /// A human-agent handoff was requested: speak the closing phrase, then
    /// request session termination once the egress queue drains.
    Escalate { reason: Option<String> },
}

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    speaker: Arc<dyn PhraseSpeaker>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<AgentRegistry>, speaker: Arc<dyn PhraseSpeaker>, config: OrchestratorConfig) -> Self {
        Self { registry, speaker, config }
    }

    /// Runs the full algorithm of spec §4.5 for one `(memory, utterance)`.
    pub async fn route(
        &self,
        memory: &mut CoreMemory,
        utterance: &str,
        sink: &dyn AudioSink,
        is_provider_call: bool,
        turn_epoch: u64,
    ) -> OrchestratorOutcome {
        if utterance.trim().is_empty() {
            return OrchestratorOutcome::Continue;
        }

        // Step 1: resolve active_agent, falling back to the entry agent
        // for unknown or unset values (spec §3 invariant, §4.5 step 1).
        if !self.registry.contains(&memory.active_agent) {
            memory.active_agent = self.registry.entry_agent().to_string();
        }
        let agent_name = memory.active_agent.clone();

        // Step 2: look up the handler; missing falls back to the entry
        // agent with a "fallback" context tag.
        let (handler, agent_name, is_fallback) = match self.registry.lookup(&agent_name) {
            Some(handler) => (handler, agent_name, false),
            None => {
                let entry = self.registry.entry_agent().to_string();
                let handler = self
                    .registry
                    .lookup(&entry)
                    .expect("AgentRegistryBuilder::build rejects an entry agent with no handler");
                (handler, entry, true)
            }
        };
        if is_fallback {
            memory
                .context
                .insert("fallback".to_string(), serde_json::json!(true));
        }

        let envelope = match self.invoke(&*handler, memory, utterance, sink, is_provider_call, turn_epoch).await {
            Some(envelope) => envelope,
            None => {
                self.speak_and_log(memory, &agent_name, &self.config.apology_phrase.clone(), sink, turn_epoch)
                    .await;
                return OrchestratorOutcome::Continue;
            }
        };

        self.interpret(memory, utterance, &agent_name, envelope, sink, is_provider_call, turn_epoch)
            .await
    }

    /// Step 3: invoke the handler under the turn deadline, recording
    /// latency into `memory.latency_marks`. Returns `None` on timeout.
    async fn invoke(
        &self,
        handler: &(dyn crate::handler::AgentHandler),
        memory: &mut CoreMemory,
        utterance: &str,
        sink: &dyn AudioSink,
        is_provider_call: bool,
        turn_epoch: u64,
    ) -> Option<ToolEnvelope> {
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.config.turn_deadline,
            handler.respond(memory, utterance, sink, is_provider_call, turn_epoch),
        )
        .await;
        let elapsed = start.elapsed().as_millis() as u64;
        match result {
            Ok(envelope) => {
                memory.record_latency(&format!("handler:{}", memory.active_agent), elapsed);
                Some(envelope)
            }
            Err(_) => {
                memory
                    .context
                    .insert("last_error".to_string(), serde_json::json!("orchestrator timeout"));
                None
            }
        }
    }

    /// Step 4: interpret the envelope for handoff, escalation, or
    /// completion, applying the tie-breaks of spec §4.5.
    #[allow(clippy::too_many_arguments)]
    async fn interpret(
        &self,
        memory: &mut CoreMemory,
        utterance: &str,
        agent_name: &str,
        envelope: ToolEnvelope,
        sink: &dyn AudioSink,
        is_provider_call: bool,
        turn_epoch: u64,
    ) -> OrchestratorOutcome {
        // Escalation always wins a simultaneous handoff+escalation
        // envelope; our `Handoff` enum already makes the two mutually
        // exclusive by construction, so this check is the only arm that
        // can fire for a human handoff (see DESIGN.md open question 2).
        if matches!(envelope.handoff, Some(Handoff::HumanAgent)) {
            memory
                .context
                .insert("escalation_requested".to_string(), serde_json::json!(true));
            if let Some(reason) = &envelope.reason {
                memory
                    .context
                    .insert("last_error".to_string(), serde_json::json!(reason));
            }
            self.speak_and_log(memory, agent_name, &self.config.escalation_phrase.clone(), sink, turn_epoch)
                .await;
            return OrchestratorOutcome::Escalate { reason: envelope.reason.clone() };
        }

        if matches!(envelope.handoff, Some(Handoff::AiAgent)) {
            let Some(target) = envelope.target_agent.clone() else {
                return OrchestratorOutcome::Continue;
            };
            let Some(target_spec) = self.registry.spec(&target) else {
                tracing::warn!(target = %target, "unknown target_agent in handoff; ignoring");
                return OrchestratorOutcome::Continue;
            };

            // Handoff to the currently-active agent: no voice change, no
            // greeting, turn continues as normal (spec §8 boundary case).
            if target == agent_name {
                return OrchestratorOutcome::Continue;
            }

            memory.active_agent = target.clone();
            memory.set_voice_profile(&target_spec.voice.name, &target_spec.voice.style, target_spec.voice.rate);

            let already_greeted = memory.has_greeted(&target);
            let greeting = if already_greeted {
                target_spec
                    .reentry_phrase
                    .clone()
                    .unwrap_or_else(|| format!("You're back with {target}."))
            } else {
                target_spec
                    .greeting
                    .clone()
                    .unwrap_or_else(|| format!("Connecting you with {target} now."))
            };
            memory.mark_greeted(&target);
            self.speak_and_log(memory, &target, &greeting, sink, turn_epoch).await;

            // Continue the turn: invoke the target's respond exactly once
            // with the same utterance (spec §9 open question 2).
            if let Some(target_handler) = self.registry.lookup(&target) {
                let Some(follow_up) = self
                    .invoke(&*target_handler, memory, utterance, sink, is_provider_call, turn_epoch)
                    .await
                else {
                    self.speak_and_log(memory, &target, &self.config.apology_phrase.clone(), sink, turn_epoch)
                        .await;
                    return OrchestratorOutcome::Continue;
                };

                if matches!(follow_up.handoff, Some(Handoff::HumanAgent)) {
                    memory
                        .context
                        .insert("escalation_requested".to_string(), serde_json::json!(true));
                    self.speak_and_log(memory, &target, &self.config.escalation_phrase.clone(), sink, turn_epoch)
                        .await;
                    return OrchestratorOutcome::Escalate { reason: follow_up.reason };
                }
                if !follow_up.success {
                    self.speak_and_log(memory, &target, &self.config.apology_phrase.clone(), sink, turn_epoch)
                        .await;
                }
            }
            return OrchestratorOutcome::Continue;
        }

        // Tool call failure: apologize, keep the current agent.
        if !envelope.success {
            if let Some(reason) = &envelope.reason {
                memory
                    .context
                    .insert("last_error".to_string(), serde_json::json!(reason));
            }
            self.speak_and_log(memory, agent_name, &self.config.apology_phrase.clone(), sink, turn_epoch)
                .await;
        }

        OrchestratorOutcome::Continue
    }

    /// Synthesizes a fixed system phrase and records it in history (spec
    /// §7: "the transcript of such phrases is recorded in history").
    async fn speak_and_log(
        &self,
        memory: &mut CoreMemory,
        agent_name: &str,
        phrase: &str,
        sink: &dyn AudioSink,
        turn_epoch: u64,
    ) {
        self.speaker.speak(agent_name, phrase, turn_epoch, sink).await;
        memory.append_history(
            HistoryEntry::new(agent_name, Role::Assistant, phrase, turn_epoch),
            self.config.history_policy,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::RecordingSink;
    use crate::handler::AgentHandler;
    use crate::registry::AgentRegistryBuilder;
    use async_trait::async_trait;
    use voice_core::agent_spec::{AgentSpec, ModelSpec, PromptsSpec, VoiceSpec};

    fn spec(name: &str, greeting: Option<&str>) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            description: String::new(),
            model: ModelSpec { deployment_id: "gpt-4o-mini".into(), temperature: 0.7, max_tokens: 512 },
            voice: VoiceSpec { name: format!("{name}-voice"), style: "neutral".into(), rate: 1.0 },
            prompts: PromptsSpec { path: format!("prompts/{name}.md") },
            tools: vec![],
            greeting: greeting.map(|s| s.to_string()),
            reentry_phrase: None,
        }
    }

    struct NullSpeaker;
    #[async_trait]
    impl PhraseSpeaker for NullSpeaker {
        async fn speak(&self, _agent_name: &str, _text: &str, _turn_epoch: u64, _sink: &dyn AudioSink) {}
    }

    struct HandoffHandler { target: &'static str }
    #[async_trait]
    impl AgentHandler for HandoffHandler {
        async fn respond(
            &self,
            _memory: &mut CoreMemory,
            _utterance: &str,
            _sink: &dyn AudioSink,
            _is_provider_call: bool,
            _turn_epoch: u64,
        ) -> ToolEnvelope {
            ToolEnvelope::default().handoff_to(self.target, "payments")
        }
    }

    struct EchoHandler;
    #[async_trait]
    impl AgentHandler for EchoHandler {
        async fn respond(
            &self,
            _memory: &mut CoreMemory,
            utterance: &str,
            _sink: &dyn AudioSink,
            _is_provider_call: bool,
            _turn_epoch: u64,
        ) -> ToolEnvelope {
            ToolEnvelope::ok(format!("echo: {utterance}"))
        }
    }

    struct EscalatingHandler;
    #[async_trait]
    impl AgentHandler for EscalatingHandler {
        async fn respond(
            &self,
            _memory: &mut CoreMemory,
            _utterance: &str,
            _sink: &dyn AudioSink,
            _is_provider_call: bool,
            _turn_epoch: u64,
        ) -> ToolEnvelope {
            ToolEnvelope::default().escalate("backend_error")
        }
    }

    fn orchestrator(registry: AgentRegistry) -> Orchestrator {
        Orchestrator::new(Arc::new(registry), Arc::new(NullSpeaker), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn handoff_switches_active_agent_and_greets_once() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("AuthAgent", None), Arc::new(HandoffHandler { target: "Billing" }))
            .register(spec("Billing", Some("Hi, this is Billing.")), Arc::new(EchoHandler))
            .configure("AuthAgent", vec!["Billing".to_string()])
            .build()
            .unwrap();
        let orchestrator = orchestrator(registry);
        let sink = RecordingSink::default();
        let mut memory = CoreMemory::new("s1", "AuthAgent");

        let outcome = orchestrator.route(&mut memory, "I need to pay my bill", &sink, false, 1).await;

        assert_eq!(outcome, OrchestratorOutcome::Continue);
        assert_eq!(memory.active_agent, "Billing");
        assert_eq!(memory.context.get("voice_name").unwrap(), "Billing-voice");
        assert!(memory.has_greeted("Billing"));
        let greeting_entries: Vec<_> = memory
            .history
            .iter()
            .filter(|e| e.role == voice_core::memory::Role::Assistant && e.agent_name == "Billing")
            .collect();
        assert_eq!(greeting_entries.len(), 1);
    }

    #[tokio::test]
    async fn unknown_target_agent_is_ignored() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("AuthAgent", None), Arc::new(HandoffHandler { target: "Nonexistent" }))
            .configure("AuthAgent", vec![])
            .build()
            .unwrap();
        let orchestrator = orchestrator(registry);
        let sink = RecordingSink::default();
        let mut memory = CoreMemory::new("s1", "AuthAgent");

        orchestrator.route(&mut memory, "hello", &sink, false, 1).await;
        assert_eq!(memory.active_agent, "AuthAgent");
    }

    #[tokio::test]
    async fn escalation_sets_context_flag_and_emits_closing_phrase() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("AuthAgent", None), Arc::new(EscalatingHandler))
            .configure("AuthAgent", vec![])
            .build()
            .unwrap();
        let orchestrator = orchestrator(registry);
        let sink = RecordingSink::default();
        let mut memory = CoreMemory::new("s1", "AuthAgent");

        let outcome = orchestrator.route(&mut memory, "I want a human", &sink, false, 1).await;

        assert_eq!(outcome, OrchestratorOutcome::Escalate { reason: Some("backend_error".to_string()) });
        assert_eq!(memory.context.get("escalation_requested").unwrap(), true);
    }

    #[tokio::test]
    async fn empty_utterance_skips_invocation_and_history() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("AuthAgent", None), Arc::new(EchoHandler))
            .configure("AuthAgent", vec![])
            .build()
            .unwrap();
        let orchestrator = orchestrator(registry);
        let sink = RecordingSink::default();
        let mut memory = CoreMemory::new("s1", "AuthAgent");

        let outcome = orchestrator.route(&mut memory, "   ", &sink, false, 1).await;
        assert_eq!(outcome, OrchestratorOutcome::Continue);
        assert!(memory.history.is_empty());
    }

    #[tokio::test]
    async fn handoff_to_active_agent_is_a_noop() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("Billing", Some("Hi")), Arc::new(HandoffHandler { target: "Billing" }))
            .configure("Billing", vec![])
            .build()
            .unwrap();
        let orchestrator = orchestrator(registry);
        let sink = RecordingSink::default();
        let mut memory = CoreMemory::new("s1", "Billing");

        orchestrator.route(&mut memory, "still here", &sink, false, 1).await;
        assert!(!memory.has_greeted("Billing"));
    }

    #[tokio::test]
    async fn session_with_a_stale_active_agent_falls_back_to_the_entry_agent() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("AuthAgent", None), Arc::new(EchoHandler))
            .configure("AuthAgent", vec![])
            .build()
            .unwrap();
        let orchestrator = orchestrator(registry);
        let sink = RecordingSink::default();
        // A session created against an agent that was since removed from
        // the roster; route() must recover rather than fail the lookup.
        let mut memory = CoreMemory::new("s1", "RetiredAgent");

        let outcome = orchestrator.route(&mut memory, "hello", &sink, false, 1).await;

        assert_eq!(outcome, OrchestratorOutcome::Continue);
        assert_eq!(memory.active_agent, "AuthAgent");
    }
}
