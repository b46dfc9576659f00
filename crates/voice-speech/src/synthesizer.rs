//! `Synthesizer` and `SynthesizerPool` (spec §4.3).
//!
//! Synthesis is modeled as a cancellable async stream, per the
//! "cancellable iterator/stream whose producer checks a cancellation
//! token between frames" re-architecture note (spec §9). The token is a
//! one-shot `AtomicBool` flip mirroring the reference `StreamingTts`'s
//! `barge_in()` flag (`pipeline::tts::streaming`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::sync::Semaphore;
use voice_core::audio::{AudioFrame, Channels, SampleRate};

use crate::backoff::{retry_with_backoff, BackoffPolicy};
use crate::error::{Result, SpeechError};

#[derive(Debug, Clone)]
pub struct VoiceProfile {
    pub name: String,
    pub style: String,
    pub rate: f32,
}

/// One-shot cancellation flag shared between a frame stream and its owner.
/// Checked between frames so synthesis stops within the bounded teardown
/// window (spec §4.3: target <= 200ms).
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The pluggable synthesis algorithm. `StubBackend` below produces
/// deterministic silent frames sized to the text length, standing in for
/// a real TTS SDK (mirrors `StreamingTts::simple` in the reference).
pub trait SynthesizerBackend: Send + Sync {
    /// Splits `text` into a finite ordered sequence of chunks to render.
    /// Each chunk becomes one `AudioFrame` in the output stream.
    fn chunks(&self, text: &str) -> Vec<String>;

    /// Renders one chunk of text into PCM samples at `sample_rate`.
    fn render_chunk(&self, chunk: &str, profile: &VoiceProfile, sample_rate: SampleRate) -> Vec<i16>;
}

pub struct StubBackend;

impl SynthesizerBackend for StubBackend {
    fn chunks(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(|w| w.to_string()).collect()
    }

    fn render_chunk(&self, chunk: &str, profile: &VoiceProfile, sample_rate: SampleRate) -> Vec<i16> {
        let ms_per_char = (60.0 / profile.rate.max(0.1)) as usize;
        let duration_ms = (chunk.len() * ms_per_char).max(20);
        let n_samples = sample_rate.as_u32() as usize * duration_ms / 1000;
        (0..n_samples)
            .map(|i| {
                let t = i as f32 / sample_rate.as_u32() as f32;
                (1000.0 * (t * 220.0 * std::f32::consts::TAU).sin()) as i16
            })
            .collect()
    }
}

/// A single-tenant acquisition from `SynthesizerPool`.
pub struct Synthesizer {
    backend: Arc<dyn SynthesizerBackend>,
    slot: usize,
}

impl Synthesizer {
    /// Produces a lazy, finite, cancellable sequence of frames for `text`
    /// (spec §4.3 `synthesize_frames`). The stream stops yielding within
    /// one render step of `cancel()` being called, satisfying the <= 200ms
    /// teardown target since each chunk is a few tens of milliseconds.
    pub fn synthesize_frames(
        &self,
        text: String,
        profile: VoiceProfile,
        sample_rate: SampleRate,
        turn_epoch: u64,
        cancel: CancelToken,
    ) -> impl Stream<Item = AudioFrame> {
        let backend = self.backend.clone();
        let chunks = backend.chunks(&text);
        stream! {
            for (sequence, chunk) in chunks.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    return;
                }
                let samples = backend.render_chunk(&chunk, &profile, sample_rate);
                if cancel.is_cancelled() {
                    return;
                }
                yield AudioFrame::new(samples, sample_rate, Channels::Mono, sequence as u64, turn_epoch);
            }
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

pub type SynthesizerBackendFactory = Arc<dyn Fn() -> Arc<dyn SynthesizerBackend> + Send + Sync>;

pub struct SynthesizerPool {
    factory: SynthesizerBackendFactory,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    size: usize,
}

impl SynthesizerPool {
    pub fn new(size: usize, acquire_timeout: Duration, factory: SynthesizerBackendFactory) -> Self {
        Self {
            factory,
            permits: Arc::new(Semaphore::new(size)),
            acquire_timeout,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn acquire(&self, _profile: &VoiceProfile) -> Result<PooledSynthesizer> {
        let permits = self.permits.clone();
        let timeout = self.acquire_timeout;
        let factory = self.factory.clone();

        retry_with_backoff(BackoffPolicy::default(), || {
            let permits = permits.clone();
            let factory = factory.clone();
            async move {
                let permit = tokio::time::timeout(timeout, permits.acquire_owned())
                    .await
                    .map_err(|_| SpeechError::AcquireTimeout(timeout))?
                    .expect("semaphore is never closed");
                let slot = permits.available_permits();
                Ok(PooledSynthesizer {
                    synthesizer: Synthesizer { backend: factory(), slot },
                    _permit: permit,
                })
            }
        })
        .await
        .map_err(|_: SpeechError| SpeechError::ServiceUnavailable("synthesizer pool exhausted".into()))
    }
}

/// RAII handle: releases the pool permit on drop (spec §4.3 `release`).
pub struct PooledSynthesizer {
    synthesizer: Synthesizer,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledSynthesizer {
    type Target = Synthesizer;
    fn deref(&self) -> &Synthesizer {
        &self.synthesizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn stub_factory() -> SynthesizerBackendFactory {
        Arc::new(|| Arc::new(StubBackend) as Arc<dyn SynthesizerBackend>)
    }

    #[tokio::test]
    async fn synthesizes_one_frame_per_word() {
        let pool = SynthesizerPool::new(2, Duration::from_secs(1), stub_factory());
        let profile = VoiceProfile { name: "en-US-JennyNeural".into(), style: "neutral".into(), rate: 1.0 };
        let synth = pool.acquire(&profile).await.unwrap();

        let frames: Vec<_> = synth
            .synthesize_frames("hello there friend".into(), profile, SampleRate::Hz16000, 3, CancelToken::new())
            .collect()
            .await;
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.turn_epoch == 3));
    }

    #[tokio::test]
    async fn cancel_stops_the_stream_early() {
        let pool = SynthesizerPool::new(1, Duration::from_secs(1), stub_factory());
        let profile = VoiceProfile { name: "en-US-JennyNeural".into(), style: "neutral".into(), rate: 1.0 };
        let synth = pool.acquire(&profile).await.unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let frames: Vec<_> = synth
            .synthesize_frames(
                "this is a long phrase with many words".into(),
                profile,
                SampleRate::Hz16000,
                1,
                cancel,
            )
            .collect()
            .await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn pool_acquire_times_out_when_exhausted() {
        let pool = SynthesizerPool::new(1, Duration::from_millis(20), stub_factory());
        let profile = VoiceProfile { name: "v".into(), style: "neutral".into(), rate: 1.0 };
        let _held = pool.acquire(&profile).await.unwrap();
        assert!(pool.acquire(&profile).await.is_err());
    }
}
