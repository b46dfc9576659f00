//! The `PhraseSpeaker` wired into the shared `Orchestrator`: renders a
//! fixed system phrase through the `SynthesizerPool` in the target agent's
//! configured voice (spec §4.5 greeting/apology/escalation phrases).

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use voice_agent_rt::{AgentRegistry, AudioSink, PhraseSpeaker};
use voice_core::audio::SampleRate;
use voice_speech::{CancelToken, SynthesizerPool, VoiceProfile};

pub struct SynthesizingPhraseSpeaker {
    registry: Arc<AgentRegistry>,
    synthesizer_pool: Arc<SynthesizerPool>,
    sample_rate: SampleRate,
}

impl SynthesizingPhraseSpeaker {
    pub fn new(registry: Arc<AgentRegistry>, synthesizer_pool: Arc<SynthesizerPool>, sample_rate: SampleRate) -> Self {
        Self { registry, synthesizer_pool, sample_rate }
    }

    fn voice_profile_for(&self, agent_name: &str) -> VoiceProfile {
        self.registry
            .spec(agent_name)
            .map(|spec| VoiceProfile {
                name: spec.voice.name.clone(),
                style: spec.voice.style.clone(),
                rate: spec.voice.rate,
            })
            .unwrap_or_else(|| VoiceProfile { name: "default".into(), style: "neutral".into(), rate: 1.0 })
    }
}

#[async_trait]
impl PhraseSpeaker for SynthesizingPhraseSpeaker {
    async fn speak(&self, agent_name: &str, text: &str, turn_epoch: u64, sink: &dyn AudioSink) {
        let profile = self.voice_profile_for(agent_name);
        let synth = match self.synthesizer_pool.acquire(&profile).await {
            Ok(synth) => synth,
            Err(e) => {
                tracing::warn!(agent = agent_name, error = %e, "could not synthesize system phrase");
                return;
            }
        };
        let frames: Vec<_> = synth
            .synthesize_frames(text.to_string(), profile, self.sample_rate, turn_epoch, CancelToken::new())
            .collect()
            .await;
        sink.enqueue_all(frames).await;
    }
}
