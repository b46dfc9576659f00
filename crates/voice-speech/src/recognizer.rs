//! `Recognizer` and `RecognizerPool` (spec §4.3).
//!
//! The recognizer SDK these types stand in for exposes a blocking,
//! callback-driven API, so each acquired `Recognizer` owns a dedicated OS
//! thread (spec §5, §9: "the recognizer thread never touches shared
//! session state directly"). Frames cross into the thread over a bounded
//! `std::sync::mpsc` channel; partials and finals cross back out over a
//! `watch` channel (newest-wins) and a `FinalQueue` (bounded, depth 8)
//! respectively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use voice_core::audio::AudioFrame;

use crate::backoff::{retry_with_backoff, BackoffPolicy};
use crate::error::{Result, SpeechError};
use crate::final_queue::FinalQueue;

#[derive(Debug, Clone)]
pub struct PartialTranscript {
    pub text: String,
    pub lang: String,
    pub speaker: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FinalTranscript {
    pub text: String,
    pub lang: String,
}

/// What one fed frame produced, synchronously, from the backend.
pub enum RecognitionEvent {
    Partial(PartialTranscript),
    Final(FinalTranscript),
}

/// The pluggable recognition algorithm run on the worker thread. A real
/// implementation wraps a cloud or on-device streaming SDK; `StubBackend`
/// below is a deterministic VAD-driven stand-in used by tests and local
/// development, matching the reference pipeline's `StreamingStt::simple`
/// testing convention.
pub trait RecognizerBackend: Send {
    fn feed(&mut self, frame: &AudioFrame) -> Vec<RecognitionEvent>;
    /// Called on `stop()`: flush any buffered partial into a final
    /// boundary, matching the "synthetic on_final boundary" reconnect
    /// behavior in spec §4.3.
    fn flush(&mut self) -> Option<FinalTranscript>;
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub languages: Vec<String>,
    pub diarization: bool,
}

enum WorkerMsg {
    Frame(AudioFrame),
    Stop,
}

/// A single-tenant acquisition from `RecognizerPool`.
pub struct Recognizer {
    feed_tx: std_mpsc::SyncSender<WorkerMsg>,
    partial_rx: watch::Receiver<Option<PartialTranscript>>,
    finals: Arc<FinalQueue<FinalTranscript>>,
    worker: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
    slot: usize,
}

impl Recognizer {
    fn spawn(mut backend: Box<dyn RecognizerBackend>, slot: usize) -> Self {
        let (feed_tx, feed_rx) = std_mpsc::sync_channel::<WorkerMsg>(32);
        let (partial_tx, partial_rx) = watch::channel(None);
        let finals = FinalQueue::new(8);
        let finals_worker = finals.clone();
        let stopped = Arc::new(AtomicBool::new(false));

        let worker = std::thread::Builder::new()
            .name(format!("recognizer-worker-{slot}"))
            .spawn(move || {
                while let Ok(msg) = feed_rx.recv() {
                    match msg {
                        WorkerMsg::Frame(frame) => {
                            for event in backend.feed(&frame) {
                                match event {
                                    RecognitionEvent::Partial(p) => {
                                        let _ = partial_tx.send(Some(p));
                                    }
                                    RecognitionEvent::Final(f) => {
                                        finals_worker.push(f);
                                    }
                                }
                            }
                        }
                        WorkerMsg::Stop => {
                            if let Some(f) = backend.flush() {
                                finals_worker.push(f);
                            }
                            break;
                        }
                    }
                }
            })
            .expect("spawning recognizer worker thread");

        Self {
            feed_tx,
            partial_rx,
            finals,
            worker: Some(worker),
            stopped,
            slot,
        }
    }

    /// Pushes one PCM frame into the recognizer (spec §4.3 `feed`). Drops
    /// the frame with a logged warning if the worker is saturated, never
    /// blocking the caller (§5: "lock-free ring-buffer writes bounded by
    /// the recognizer's internal capacity").
    pub fn feed(&self, frame: AudioFrame) {
        if self.feed_tx.try_send(WorkerMsg::Frame(frame)).is_err() {
            tracing::warn!(slot = self.slot, "recognizer feed buffer full, dropping frame");
        }
    }

    /// `on_partial` equivalent: the current hypothesis, updated on every
    /// change. Cheap to poll; never blocks (spec §4.3).
    pub fn subscribe_partial(&self) -> watch::Receiver<Option<PartialTranscript>> {
        self.partial_rx.clone()
    }

    /// `on_final` equivalent: awaits the next completed utterance boundary.
    pub async fn next_final(&self) -> FinalTranscript {
        self.finals.pop().await
    }

    /// Idempotent; drains and closes the worker.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.feed_tx.send(WorkerMsg::Stop);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Factory for recognizer backends, one per pool slot (spec §4.3
/// `RecognizerPool`). Boxed so tests can install a deterministic stub
/// while production wires a real SDK client.
pub type BackendFactory = Arc<dyn Fn(&RecognizerConfig) -> Box<dyn RecognizerBackend> + Send + Sync>;

pub struct RecognizerPool {
    factory: BackendFactory,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    size: usize,
}

impl RecognizerPool {
    pub fn new(size: usize, acquire_timeout: Duration, factory: BackendFactory) -> Self {
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

    /// Blocks until a client is free or fails with `AcquireTimeout` (spec
    /// §4.3 `acquire`). Retries the bounded wait per the failure policy
    /// (3 attempts, 100ms -> 400ms -> 1.6s) before giving up as
    /// `ServiceUnavailable`.
    pub async fn acquire(&self, config: &RecognizerConfig) -> Result<PooledRecognizer> {
        let permits = self.permits.clone();
        let timeout = self.acquire_timeout;
        let factory = self.factory.clone();
        let config = config.clone();

        retry_with_backoff(BackoffPolicy::default(), || {
            let permits = permits.clone();
            let factory = factory.clone();
            let config = config.clone();
            async move {
                let permit = tokio::time::timeout(timeout, permits.acquire_owned())
                    .await
                    .map_err(|_| SpeechError::AcquireTimeout(timeout))?
                    .expect("semaphore is never closed");
                let backend = factory(&config);
                let slot = permits.available_permits();
                Ok(PooledRecognizer {
                    recognizer: Some(Recognizer::spawn(backend, slot)),
                    _permit: permit,
                })
            }
        })
        .await
        .map_err(|_: SpeechError| SpeechError::ServiceUnavailable("recognizer pool exhausted".into()))
    }
}

/// RAII handle: releases the pool permit when dropped (spec §4.3
/// `release`, modeled as "returns to the pool after a reset" via drop).
pub struct PooledRecognizer {
    recognizer: Option<Recognizer>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledRecognizer {
    type Target = Recognizer;
    fn deref(&self) -> &Recognizer {
        self.recognizer.as_ref().expect("recognizer present until drop")
    }
}

impl std::ops::DerefMut for PooledRecognizer {
    fn deref_mut(&mut self) -> &mut Recognizer {
        self.recognizer.as_mut().expect("recognizer present until drop")
    }
}

impl Drop for PooledRecognizer {
    fn drop(&mut self) {
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }
    }
}

/// A deterministic, energy-gated recognizer backend used for tests and
/// local development without a real streaming STT SDK attached.
pub struct StubBackend {
    speech_frames: u32,
    silence_frames: u32,
    in_speech: bool,
    words_seen: u32,
    lang: String,
}

impl StubBackend {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            speech_frames: 0,
            silence_frames: 0,
            in_speech: false,
            words_seen: 0,
            lang: lang.into(),
        }
    }

    fn is_speech(frame: &AudioFrame) -> bool {
        if frame.samples.is_empty() {
            return false;
        }
        let energy: i64 = frame.samples.iter().map(|s| (*s as i64).abs()).sum();
        (energy / frame.samples.len() as i64) > 200
    }
}

const PARTIAL_EVERY_N_SPEECH_FRAMES: u32 = 5;
const SILENCE_FRAMES_FOR_FINAL: u32 = 10;

impl RecognizerBackend for StubBackend {
    fn feed(&mut self, frame: &AudioFrame) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        if Self::is_speech(frame) {
            self.in_speech = true;
            self.speech_frames += 1;
            self.silence_frames = 0;
            if self.speech_frames % PARTIAL_EVERY_N_SPEECH_FRAMES == 0 {
                self.words_seen += 1;
                events.push(RecognitionEvent::Partial(PartialTranscript {
                    text: format!("partial utterance word{}", self.words_seen),
                    lang: self.lang.clone(),
                    speaker: None,
                }));
            }
        } else if self.in_speech {
            self.silence_frames += 1;
            if self.silence_frames >= SILENCE_FRAMES_FOR_FINAL {
                events.push(RecognitionEvent::Final(FinalTranscript {
                    text: format!("utterance with {} words", self.words_seen.max(1)),
                    lang: self.lang.clone(),
                }));
                self.in_speech = false;
                self.speech_frames = 0;
                self.silence_frames = 0;
                self.words_seen = 0;
            }
        }
        events
    }

    fn flush(&mut self) -> Option<FinalTranscript> {
        if self.in_speech && self.words_seen > 0 {
            let text = format!("utterance with {} words", self.words_seen);
            self.in_speech = false;
            self.words_seen = 0;
            Some(FinalTranscript { text, lang: self.lang.clone() })
        } else {
            None
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.lang.clone());
    }
}
