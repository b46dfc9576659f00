//! SpeechIO (spec §4.3): the `RecognizerPool` / `SynthesizerPool` resource
//! pools, the worker-thread bridge for the recognizer, and the
//! cancellable synthesis stream.

pub mod backoff;
pub mod error;
pub mod final_queue;
pub mod recognizer;
pub mod synthesizer;

pub use error::{Result, SpeechError};
pub use final_queue::FinalQueue;
pub use recognizer::{
    BackendFactory, FinalTranscript, PartialTranscript, PooledRecognizer, Recognizer,
    RecognitionEvent, RecognizerBackend, RecognizerConfig, RecognizerPool, StubBackend as StubRecognizerBackend,
};
pub use synthesizer::{
    CancelToken, PooledSynthesizer, Synthesizer, SynthesizerBackend, SynthesizerBackendFactory,
    SynthesizerPool, StubBackend as StubSynthesizerBackend, VoiceProfile,
};
