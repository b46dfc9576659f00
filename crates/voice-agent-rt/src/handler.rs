//! The `AgentHandler` contract (spec §4.2): an asynchronous function
//! `(memory, utterance, sink, is_provider_call) -> ToolEnvelope`.

use async_trait::async_trait;
use voice_core::audio::AudioFrame;
use voice_core::memory::{CoreMemory, ToolEnvelope};

/// Where a handler (or the orchestrator, for greetings/apologies) enqueues
/// synthesized audio. Implemented by `voice-media`'s egress lane, which
/// tags outgoing frames with the active `turn_epoch` so cancelled turns
/// can be discarded at the socket boundary (spec §4.4 step 7).
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn enqueue(&self, frame: AudioFrame);

    /// Convenience for handlers that only have text: synthesizes nothing
    /// itself (that's `voice-speech`'s job) but documents the call site a
    /// handler uses to push its finished frames. Handlers are expected to
    /// call `enqueue` for each frame produced by a `Synthesizer`.
    async fn enqueue_all(&self, frames: Vec<AudioFrame>) {
        for frame in frames {
            self.enqueue(frame).await;
        }
    }
}

/// A specialist's response function (spec §4.2).
///
/// Handlers must not return before all audio they emit has been enqueued
/// via `sink` (but need not wait for playout to complete). They may
/// append to `memory.history` and mutate `memory.context`, treating the
/// memory as single-threaded within one invocation (spec §4.2, §5).
/// `turn_epoch` is the epoch of the turn being served; a handler that
/// synthesizes its own audio must stamp every frame with it so a
/// barge-in mid-response discards exactly this turn's frames downstream
/// (spec §4.4 step 7).
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn respond(
        &self,
        memory: &mut CoreMemory,
        utterance: &str,
        sink: &dyn AudioSink,
        is_provider_call: bool,
        turn_epoch: u64,
    ) -> ToolEnvelope;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub frames: Mutex<Vec<AudioFrame>>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn enqueue(&self, frame: AudioFrame) {
            self.frames.lock().push(frame);
        }
    }
}
