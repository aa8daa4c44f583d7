/// Hotword session state machine.
///
/// The polling loop at the center of the listener: drains the ring buffer,
/// feeds chunks to the keyword scorer, and drives the PASSIVE/ACTIVE
/// transition that records the phrase spoken after a keyword.

use crate::recorder::{EndOfPhrase, PhraseProgress, PhraseRecorder, StorageError};
use crate::ring_buffer::RingBuffer;
use crate::scorer::{ConfigError, DetectionStatus, KeywordScorer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Invoked synchronously from the polling loop when its hotword fires.
/// Must stay short-lived: detection waits for it.
pub type DetectedCallback = Arc<dyn Fn() + Send + Sync>;

/// Receives the path of every finalized phrase artifact.
pub type RecordingConsumer = Box<dyn FnMut(&Path) + Send>;

/// Session states: awaiting a keyword vs. recording the phrase after one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Passive,
    Active,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Poll tick, used only when the ring buffer came up empty.
    pub sleep_time: Duration,

    /// Seconds of recent audio the ring buffer window retains.
    pub window_seconds: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sleep_time: Duration::from_millis(30),
            window_seconds: 5,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sleep_time.is_zero() {
            return Err(ConfigError::Invalid(
                "sleep time must be greater than 0".to_string(),
            ));
        }

        if self.window_seconds == 0 {
            return Err(ConfigError::Invalid(
                "window must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}

/// Cloneable cancellation handle for a session loop.
#[derive(Clone)]
pub struct SessionHandle {
    running: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Ask the loop to stop at its next tick.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Session counters, mostly for logging and tests.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub chunks_processed: u64,
    pub keywords_detected: u64,
    pub buffered_bytes: usize,
}

/// Orchestrates detection: ring buffer in, scorer verdicts, state machine,
/// callbacks out.
///
/// The session never touches audio hardware; the caller owns the input
/// stream and shares only the ring buffer with it. A session is one-shot:
/// once cancelled it stays stopped, and re-arming means building a new one.
pub struct HotwordSession {
    scorer: Box<dyn KeywordScorer>,
    recorder: PhraseRecorder,
    callbacks: Vec<DetectedCallback>,
    consumer: Option<RecordingConsumer>,
    ring: Arc<RingBuffer>,
    config: SessionConfig,
    state: SessionState,
    running: Arc<AtomicBool>,
    chunks_processed: u64,
    keywords_detected: u64,
}

impl HotwordSession {
    /// Build a session, validating the callback arity up front.
    ///
    /// A single callback given for several hotwords is broadcast to all of
    /// them; any other count mismatch fails with `ConfigError` before the
    /// loop ever starts. Without a recording consumer the session fires
    /// callbacks but never records.
    pub fn new(
        scorer: Box<dyn KeywordScorer>,
        recorder: PhraseRecorder,
        mut callbacks: Vec<DetectedCallback>,
        consumer: Option<RecordingConsumer>,
        config: SessionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let format = scorer.format();
        format.validate()?;

        let num_hotwords = scorer.num_hotwords();
        let given = callbacks.len();
        if given == 1 && num_hotwords > 1 {
            let template = callbacks[0].clone();
            callbacks.extend((1..num_hotwords).map(|_| template.clone()));
        }
        if callbacks.len() != num_hotwords {
            return Err(ConfigError::CallbackCount {
                hotwords: num_hotwords,
                given,
            });
        }

        // Window capacity follows the decoder sizing convention:
        // channels * sample_rate * window_seconds bytes.
        let capacity =
            format.channels as usize * format.sample_rate as usize * config.window_seconds;

        info!(
            "hotword session ready: {} hotword(s), {}s window, {}Hz",
            num_hotwords, config.window_seconds, format.sample_rate
        );

        Ok(Self {
            scorer,
            recorder,
            callbacks,
            consumer,
            ring: Arc::new(RingBuffer::new(capacity)),
            config,
            state: SessionState::Passive,
            running: Arc::new(AtomicBool::new(true)),
            chunks_processed: 0,
            keywords_detected: 0,
        })
    }

    /// Ring buffer the audio producer should feed.
    pub fn ring(&self) -> Arc<RingBuffer> {
        Arc::clone(&self.ring)
    }

    /// Cancellation handle usable from other tasks.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks_processed: self.chunks_processed,
            keywords_detected: self.keywords_detected,
            buffered_bytes: self.ring.len(),
        }
    }

    /// Run the detection loop until cancelled.
    ///
    /// The sleep when the buffer is empty is the loop's only suspension
    /// point; everything else runs to completion each tick.
    pub async fn run(&mut self) {
        info!("hotword session started");

        while self.running.load(Ordering::SeqCst) {
            let chunk = self.ring.drain();
            if chunk.is_empty() {
                tokio::time::sleep(self.config.sleep_time).await;
                continue;
            }
            self.process_chunk(&chunk);
        }

        info!("hotword session stopped");
    }

    /// Request the loop to stop. Idempotent: repeat calls are no-ops.
    pub fn terminate(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("session terminate requested");
        }
    }

    fn process_chunk(&mut self, chunk: &[u8]) {
        self.chunks_processed += 1;

        let status = self.scorer.classify(chunk);
        if status == DetectionStatus::Error {
            warn!("detector error, skipping chunk");
            return;
        }

        match self.state {
            SessionState::Passive => {
                if let DetectionStatus::Keyword(index) = status {
                    self.on_keyword(index);
                }
            }
            SessionState::Active => self.record_chunk(chunk),
        }
    }

    fn on_keyword(&mut self, index: usize) {
        let callback = index
            .checked_sub(1)
            .and_then(|slot| self.callbacks.get(slot))
            .cloned();
        let Some(callback) = callback else {
            // The scorer reported an index it never advertised.
            error!("keyword index {} has no registered callback", index);
            return;
        };

        self.keywords_detected += 1;
        info!("keyword {} detected", index);
        callback();

        if self.consumer.is_some() {
            self.recorder.start();
            self.state = SessionState::Active;
            debug!("session state: PASSIVE -> ACTIVE");
        }
    }

    fn record_chunk(&mut self, chunk: &[u8]) {
        match self.recorder.append(chunk) {
            PhraseProgress::AwaitingVoice | PhraseProgress::Recording => {}
            PhraseProgress::Complete(reason) => self.finish_phrase(reason),
            PhraseProgress::Abandoned => {
                warn!("no voice after keyword, phrase abandoned");
                self.state = SessionState::Passive;
                debug!("session state: ACTIVE -> PASSIVE");
            }
        }
    }

    fn finish_phrase(&mut self, reason: EndOfPhrase) {
        match self.recorder.finalize() {
            Ok(path) => {
                let why = match reason {
                    EndOfPhrase::Silence => "silence",
                    EndOfPhrase::MaxDuration => "duration cap",
                };
                info!("phrase complete ({}): {}", why, path.display());
                if let Some(consumer) = self.consumer.as_mut() {
                    consumer(&path);
                }
            }
            Err(e) => error!("failed to persist phrase: {}", e),
        }

        self.state = SessionState::Passive;
        debug!("session state: ACTIVE -> PASSIVE");
    }
}

/// One-shot phrase capture without keyword gating.
///
/// Waits for voice onset, records until the silence window or the duration
/// cap ends the phrase, and returns the artifact path. Returns `Ok(None)`
/// when cancelled first or when the cap trips before any voice arrives.
pub async fn record_phrase(
    ring: &RingBuffer,
    recorder: &mut PhraseRecorder,
    sleep_time: Duration,
    handle: &SessionHandle,
) -> Result<Option<PathBuf>, StorageError> {
    recorder.start();

    loop {
        if handle.is_cancelled() {
            // Discard whatever partial phrase was underway.
            recorder.start();
            return Ok(None);
        }

        let chunk = ring.drain();
        if chunk.is_empty() {
            tokio::time::sleep(sleep_time).await;
            continue;
        }

        match recorder.append(&chunk) {
            PhraseProgress::AwaitingVoice | PhraseProgress::Recording => {}
            PhraseProgress::Complete(reason) => {
                debug!("phrase capture complete ({:?})", reason);
                return recorder.finalize().map(Some);
            }
            PhraseProgress::Abandoned => return Ok(None),
        }
    }
}
