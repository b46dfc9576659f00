//! A minimal `AgentHandler` used to make the process runnable end to end.
//!
//! Real specialists (billing, authentication, whatever domain this call
//! center serves) are business logic that lives outside this core; the
//! core only needs something registered under every configured agent
//! name so the orchestrator has somewhere to route. This handler speaks
//! a single configured line back through the synthesizer and appends its
//! own reply to history (the turn loop already appended the caller's
//! utterance), the same way `SynthesizingPhraseSpeaker` renders the
//! orchestrator's fixed system phrases.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use voice_agent_rt::{AgentHandler, AudioSink};
use voice_core::audio::SampleRate;
use voice_core::memory::{CoreMemory, HistoryEntry, HistoryPolicy, Role, ToolEnvelope};
use voice_speech::{CancelToken, SynthesizerPool, VoiceProfile};

pub struct DemoAgentHandler {
    voice_profile: VoiceProfile,
    synthesizer_pool: Arc<SynthesizerPool>,
    sample_rate: SampleRate,
    reply: String,
}

impl DemoAgentHandler {
    pub fn new(voice_profile: VoiceProfile, synthesizer_pool: Arc<SynthesizerPool>, sample_rate: SampleRate, reply: impl Into<String>) -> Self {
        Self { voice_profile, synthesizer_pool, sample_rate, reply: reply.into() }
    }
}

#[async_trait]
impl AgentHandler for DemoAgentHandler {
    async fn respond(
        &self,
        memory: &mut CoreMemory,
        utterance: &str,
        sink: &dyn AudioSink,
        _is_provider_call: bool,
        turn_epoch: u64,
    ) -> ToolEnvelope {
        let agent_name = memory.active_agent.clone();

        match self.synthesizer_pool.acquire(&self.voice_profile).await {
            Ok(synth) => {
                let frames: Vec<_> = synth
                    .synthesize_frames(self.reply.clone(), self.voice_profile.clone(), self.sample_rate, turn_epoch, CancelToken::new())
                    .collect()
                    .await;
                sink.enqueue_all(frames).await;
            }
            Err(e) => {
                tracing::warn!(agent = %agent_name, utterance, error = %e, "demo handler could not synthesize reply");
            }
        }

        memory.append_history(
            HistoryEntry::new(agent_name, Role::Assistant, self.reply.clone(), turn_epoch),
            HistoryPolicy::default(),
        );
        ToolEnvelope::ok(self.reply.clone())
    }
}
