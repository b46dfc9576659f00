//! `AgentRegistry` (spec §4.2): the process-wide `name -> handler` mapping,
//! frozen after startup per the "global mutable registries... initialize
//! once, freeze" design note (spec §9).

use std::collections::HashMap;
use std::sync::Arc;

use voice_core::agent_spec::AgentSpec;

use crate::error::{AgentError, Result};
use crate::handler::AgentHandler;

/// Built once at startup from the loaded `AgentSpec` roster and every
/// registered handler, then shared read-only for the life of the process.
pub struct AgentRegistry {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
    specs: HashMap<String, AgentSpec>,
    entry_agent: String,
    specialists: Vec<String>,
}

impl AgentRegistry {
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn spec(&self, name: &str) -> Option<&AgentSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn entry_agent(&self) -> &str {
        &self.entry_agent
    }

    pub fn specialists(&self) -> &[String] {
        &self.specialists
    }
}

/// Builds an `AgentRegistry`. `register` and `configure` overwrite
/// idempotently (spec §4.2); the registry becomes immutable once `build`
/// is called.
#[derive(Default)]
pub struct AgentRegistryBuilder {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
    specs: HashMap<String, AgentSpec>,
    entry_agent: Option<String>,
    specialists: Vec<String>,
}

impl AgentRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any existing handler under `name` (spec §4.2: "idempotent").
    pub fn register(mut self, spec: AgentSpec, handler: Arc<dyn AgentHandler>) -> Self {
        self.handlers.insert(spec.name.clone(), handler);
        self.specs.insert(spec.name.clone(), spec);
        self
    }

    /// `entry_agent` is coerced to the system's authentication agent if
    /// not explicitly chosen; `specialists` is the ordered fallback list
    /// (spec §4.2 `configure`).
    pub fn configure(mut self, entry_agent: impl Into<String>, specialists: Vec<String>) -> Self {
        self.entry_agent = Some(entry_agent.into());
        self.specialists = specialists;
        self
    }

    /// Fails if the resolved entry agent (explicit via `configure`, or the
    /// first registered handler otherwise) has no registered handler, so a
    /// misconfigured roster is caught here instead of panicking the first
    /// time `Orchestrator::route` falls back to it.
    pub fn build(self) -> Result<AgentRegistry> {
        let entry_agent = self
            .entry_agent
            .unwrap_or_else(|| self.handlers.keys().next().cloned().unwrap_or_default());
        if !self.handlers.contains_key(&entry_agent) {
            return Err(AgentError::UnknownAgent(entry_agent));
        }
        Ok(AgentRegistry {
            handlers: self.handlers,
            specs: self.specs,
            entry_agent,
            specialists: self.specialists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::RecordingSink;
    use async_trait::async_trait;
    use voice_core::agent_spec::{ModelSpec, PromptsSpec, VoiceSpec};
    use voice_core::memory::{CoreMemory, ToolEnvelope};

    struct NoopHandler;

    #[async_trait]
    impl AgentHandler for NoopHandler {
        async fn respond(
            &self,
            _memory: &mut CoreMemory,
            _utterance: &str,
            _sink: &dyn crate::handler::AudioSink,
            _is_provider_call: bool,
            _turn_epoch: u64,
        ) -> ToolEnvelope {
            ToolEnvelope::ok("noop")
        }
    }

    fn spec(name: &str) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            description: String::new(),
            model: ModelSpec { deployment_id: "gpt-4o-mini".into(), temperature: 0.7, max_tokens: 512 },
            voice: VoiceSpec { name: "en-US-JennyNeural".into(), style: "neutral".into(), rate: 1.0 },
            prompts: PromptsSpec { path: "prompts/x.md".into() },
            tools: vec![],
            greeting: None,
            reentry_phrase: None,
        }
    }

    #[test]
    fn lookup_returns_registered_handler() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("Billing"), Arc::new(NoopHandler))
            .configure("Billing", vec![])
            .build()
            .unwrap();
        assert!(registry.lookup("Billing").is_some());
        assert!(registry.lookup("Unknown").is_none());
    }

    #[test]
    fn entry_agent_falls_back_to_first_registered_when_unset() {
        let registry = AgentRegistryBuilder::new()
            .register(spec("Auth"), Arc::new(NoopHandler))
            .build()
            .unwrap();
        assert_eq!(registry.entry_agent(), "Auth");
    }

    #[test]
    fn build_rejects_an_entry_agent_with_no_registered_handler() {
        let result = AgentRegistryBuilder::new()
            .register(spec("Billing"), Arc::new(NoopHandler))
            .configure("Nonexistent", vec!["Billing".to_string()])
            .build();
        assert!(matches!(result, Err(AgentError::UnknownAgent(name)) if name == "Nonexistent"));
    }

    #[test]
    fn build_rejects_an_empty_registry() {
        let result = AgentRegistryBuilder::new().build();
        assert!(matches!(result, Err(AgentError::UnknownAgent(name)) if name.is_empty()));
    }

    #[tokio::test]
    async fn recording_sink_compiles_against_handler_trait() {
        let sink = RecordingSink::default();
        let handler = NoopHandler;
        let mut memory = CoreMemory::new("s1", "Auth");
        let envelope = handler.respond(&mut memory, "hi", &sink, false, 1).await;
        assert!(envelope.success);
    }
}
