/// Hotword listening library.
///
/// Continuous microphone capture with keyword spotting: a real-time audio
/// callback feeds a bounded ring buffer, a polling session classifies each
/// drained chunk, and the phrase spoken after a keyword is recorded to a
/// WAV artifact for downstream transcription.

pub mod audio;
pub mod recorder;
pub mod ring_buffer;
pub mod scorer;
pub mod session;
pub mod vad;

// Re-export main types
pub use audio::{AudioStreamError, CaptureGate, Chime, InputStream};
pub use recorder::{EndOfPhrase, PhraseProgress, PhraseRecorder, RecorderConfig, StorageError};
pub use ring_buffer::RingBuffer;
pub use scorer::{
    AudioFormat, ConfigError, DetectionStatus, EnergyScorer, KeywordScorer, ScorerConfig,
};
pub use session::{
    record_phrase, DetectedCallback, HotwordSession, RecordingConsumer, SessionConfig,
    SessionHandle, SessionState, SessionStats,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
