/// Integration tests for the hotword session
///
/// Drives full PASSIVE -> ACTIVE -> PASSIVE cycles through the public API
/// with a scripted scorer and synthetic audio chunks, checking the WAV
/// artifacts that come out the other end.

use hotword_listener::{
    AudioFormat, DetectionStatus, HotwordSession, KeywordScorer, PhraseRecorder, RecorderConfig,
    RecordingConsumer, SessionConfig,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;

const CHUNK_FRAMES: usize = 1024;

/// Scorer that replays a fixed script of verdicts, then reports silence.
struct ScriptedScorer {
    script: VecDeque<DetectionStatus>,
}

impl ScriptedScorer {
    fn new(script: Vec<DetectionStatus>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl KeywordScorer for ScriptedScorer {
    fn classify(&mut self, _chunk: &[u8]) -> DetectionStatus {
        self.script.pop_front().unwrap_or(DetectionStatus::Silence)
    }

    fn num_hotwords(&self) -> usize {
        1
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::default()
    }
}

/// One chunk of constant-amplitude 16-bit PCM.
fn chunk_at(amplitude: i16) -> Vec<u8> {
    std::iter::repeat(amplitude)
        .take(CHUNK_FRAMES)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

// silence limit 4 chunks at the default 16kHz rate
fn recorder_config(save_dir: PathBuf, max_phrase_secs: f32) -> RecorderConfig {
    RecorderConfig {
        silence_threshold: 1500.0,
        silence_secs: 0.256,
        max_phrase_secs,
        chunk_frames: CHUNK_FRAMES,
        save_dir,
    }
}

struct Harness {
    ring: Arc<hotword_listener::RingBuffer>,
    handle: hotword_listener::SessionHandle,
    task: tokio::task::JoinHandle<()>,
    detections: Arc<AtomicUsize>,
    recordings: Arc<Mutex<Vec<PathBuf>>>,
}

/// Spawn a session around the scripted scorer and return the knobs the
/// tests drive it with.
fn start_session(script: Vec<DetectionStatus>, save_dir: PathBuf, max_phrase_secs: f32) -> Harness {
    let scorer = ScriptedScorer::new(script);
    let recorder = PhraseRecorder::new(
        recorder_config(save_dir, max_phrase_secs),
        AudioFormat::default(),
    )
    .expect("recorder config should be valid");

    let detections = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&detections);

    let recordings: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&recordings);
    let consumer: RecordingConsumer = Box::new(move |path: &Path| {
        sink.lock().unwrap().push(path.to_path_buf());
    });

    let mut session = HotwordSession::new(
        Box::new(scorer),
        recorder,
        vec![Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })],
        Some(consumer),
        SessionConfig {
            sleep_time: Duration::from_millis(5),
            ..Default::default()
        },
    )
    .expect("session config should be valid");

    let ring = session.ring();
    let handle = session.handle();
    let task = tokio::spawn(async move {
        session.run().await;
    });

    Harness {
        ring,
        handle,
        task,
        detections,
        recordings,
    }
}

impl Harness {
    /// Feed chunks one at a time, waiting for each to be drained so the
    /// session sees them as separate chunks.
    async fn feed(&self, chunks: Vec<Vec<u8>>) {
        for chunk in chunks {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !self.ring.is_empty() {
                assert!(Instant::now() < deadline, "session stopped draining");
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            self.ring.extend(&chunk);
        }
    }

    async fn wait_for_recordings(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.recordings.lock().unwrap().len() < count {
            assert!(Instant::now() < deadline, "expected recording never arrived");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn shutdown(self) -> (usize, Vec<PathBuf>) {
        self.handle.cancel();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("session should stop after cancel")
            .expect("session task should not panic");

        let recordings = self.recordings.lock().unwrap().clone();
        (self.detections.load(Ordering::SeqCst), recordings)
    }
}

fn read_samples(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).expect("artifact should be readable");
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .map(|s| s.expect("artifact should decode"))
        .collect();
    (spec, samples)
}

#[tokio::test]
async fn test_full_detection_cycle_records_one_phrase() {
    let dir = tempdir().unwrap();
    let harness = start_session(
        vec![DetectionStatus::Keyword(1)],
        dir.path().to_path_buf(),
        2.56,
    );

    // One chunk carries the keyword, eight voiced chunks form the phrase,
    // five silent chunks close it.
    let mut feed: Vec<Vec<u8>> = vec![chunk_at(0)];
    feed.extend((0..8).map(|_| chunk_at(4000)));
    feed.extend((0..5).map(|_| chunk_at(0)));
    harness.feed(feed).await;

    harness.wait_for_recordings(1).await;
    let (detections, recordings) = harness.shutdown().await;

    assert_eq!(detections, 1);
    assert_eq!(recordings.len(), 1);

    let (spec, samples) = read_samples(&recordings[0]);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.bits_per_sample, 16);

    // The artifact holds the eight voiced chunks plus the closing silence,
    // nothing from before the onset.
    assert_eq!(samples.len(), 13 * CHUNK_FRAMES);
    assert!(samples[..8 * CHUNK_FRAMES].iter().all(|&s| s == 4000));
    assert!(samples[8 * CHUNK_FRAMES..].iter().all(|&s| s == 0));
}

#[tokio::test]
async fn test_abandoned_phrase_then_recovery() {
    let dir = tempdir().unwrap();
    // Cap at 8 chunks so the voiceless phrase gives up quickly.
    let mut script = vec![DetectionStatus::Keyword(1)];
    script.extend([DetectionStatus::Silence; 9]);
    script.push(DetectionStatus::Keyword(1));
    let harness = start_session(script, dir.path().to_path_buf(), 0.512);

    // First keyword: nothing but silence follows, the phrase is abandoned.
    let mut feed: Vec<Vec<u8>> = vec![chunk_at(0)];
    feed.extend((0..9).map(|_| chunk_at(0)));

    // Second keyword: an actual phrase follows.
    feed.push(chunk_at(0));
    feed.push(chunk_at(4000));
    feed.extend((0..5).map(|_| chunk_at(0)));
    harness.feed(feed).await;

    harness.wait_for_recordings(1).await;
    let (detections, recordings) = harness.shutdown().await;

    assert_eq!(detections, 2);
    assert_eq!(recordings.len(), 1);

    let (_, samples) = read_samples(&recordings[0]);
    assert_eq!(samples.len(), 6 * CHUNK_FRAMES);
    assert!(samples[..CHUNK_FRAMES].iter().all(|&s| s == 4000));
}

#[tokio::test]
async fn test_duration_cap_closes_long_phrase() {
    let dir = tempdir().unwrap();
    let harness = start_session(
        vec![DetectionStatus::Keyword(1)],
        dir.path().to_path_buf(),
        0.512,
    );

    // Uninterrupted voice past the 8 chunk cap.
    let mut feed: Vec<Vec<u8>> = vec![chunk_at(0)];
    feed.extend((0..9).map(|_| chunk_at(4000)));
    harness.feed(feed).await;

    harness.wait_for_recordings(1).await;
    let (detections, recordings) = harness.shutdown().await;

    assert_eq!(detections, 1);
    assert_eq!(recordings.len(), 1);

    let (_, samples) = read_samples(&recordings[0]);
    assert_eq!(samples.len(), 9 * CHUNK_FRAMES);
    assert!(samples.iter().all(|&s| s == 4000));
}
