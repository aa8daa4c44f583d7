/// Phrase recording after a keyword fires.
///
/// Accumulates raw PCM chunks from the moment voice onset is heard, ends
/// the phrase on sustained silence or on the hard duration cap, and
/// persists the result as a timestamped WAV artifact.

use crate::scorer::{AudioFormat, ConfigError};
use crate::vad;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write phrase artifact: {0}")]
    Wav(#[from] hound::Error),
}

/// Why a phrase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfPhrase {
    /// Sustained silence after voice was heard.
    Silence,
    /// The hard recording-duration cap tripped mid-phrase.
    MaxDuration,
}

/// Outcome of feeding one chunk to the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseProgress {
    /// Still waiting for voice onset; the chunk was dropped.
    AwaitingVoice,
    /// The chunk was appended to the phrase.
    Recording,
    /// The phrase is done; call [`PhraseRecorder::finalize`].
    Complete(EndOfPhrase),
    /// The cap tripped before any voice arrived; nothing to keep.
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// RMS amplitude separating silence from voice.
    pub silence_threshold: f32,

    /// Seconds of sustained silence that end a phrase.
    pub silence_secs: f32,

    /// Hard cap on the time spent recording one phrase, onset included.
    pub max_phrase_secs: f32,

    /// Nominal frames per drained chunk; sets the scale for the silence
    /// and cap counters.
    pub chunk_frames: usize,

    /// Directory phrase artifacts are written to.
    pub save_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 1500.0,
            silence_secs: 4.0,
            max_phrase_secs: 15.0,
            chunk_frames: 1024,
            save_dir: std::env::temp_dir().join("phrases"),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.silence_threshold.is_finite() || self.silence_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "silence threshold must be non-negative, got {}",
                self.silence_threshold
            )));
        }

        if self.silence_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "silence duration must be greater than 0".to_string(),
            ));
        }

        if self.max_phrase_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "max phrase duration must be greater than 0".to_string(),
            ));
        }

        if self.chunk_frames == 0 {
            return Err(ConfigError::Invalid(
                "chunk size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Accumulates one phrase at a time and flushes it to a WAV file.
pub struct PhraseRecorder {
    config: RecorderConfig,
    format: AudioFormat,
    /// Silent chunks tolerated after onset before the phrase ends.
    silence_limit: u32,
    /// Chunks allowed per phrase before the cap trips.
    max_chunks: u32,
    frames: Vec<u8>,
    voice_detected: bool,
    silence_run: u32,
    active_chunks: u32,
    seq: u32,
}

impl PhraseRecorder {
    pub fn new(config: RecorderConfig, format: AudioFormat) -> Result<Self, ConfigError> {
        config.validate()?;
        format.validate()?;

        let chunks_per_sec = format.sample_rate as f64 / config.chunk_frames as f64;
        let silence_limit = (config.silence_secs as f64 * chunks_per_sec) as u32;
        let max_chunks = (config.max_phrase_secs as f64 * chunks_per_sec) as u32;

        debug!(
            "phrase recorder ready: silence limit {} chunks, cap {} chunks",
            silence_limit, max_chunks
        );

        Ok(Self {
            config,
            format,
            silence_limit,
            max_chunks,
            frames: Vec::new(),
            voice_detected: false,
            silence_run: 0,
            active_chunks: 0,
            seq: 0,
        })
    }

    /// Begin a new phrase, discarding any leftover state.
    pub fn start(&mut self) {
        self.frames.clear();
        self.reset_counters();
    }

    /// Feed one drained chunk into the phrase.
    ///
    /// Chunks before voice onset are dropped. Once onset is heard every
    /// chunk is appended; a silence run longer than the configured window
    /// completes the phrase, and the duration cap bounds it either way.
    pub fn append(&mut self, chunk: &[u8]) -> PhraseProgress {
        self.active_chunks += 1;
        let over_cap = self.active_chunks > self.max_chunks;
        let energy = vad::rms(chunk).unwrap_or(0.0);

        if !self.voice_detected {
            if over_cap {
                self.start();
                return PhraseProgress::Abandoned;
            }
            if energy > self.config.silence_threshold {
                info!("voice onset at {:.0} rms", energy);
                self.voice_detected = true;
                self.frames.extend_from_slice(chunk);
                return PhraseProgress::Recording;
            }
            return PhraseProgress::AwaitingVoice;
        }

        self.frames.extend_from_slice(chunk);

        if over_cap {
            return PhraseProgress::Complete(EndOfPhrase::MaxDuration);
        }

        if energy < self.config.silence_threshold {
            self.silence_run += 1;
            if self.silence_run > self.silence_limit {
                info!("voice end after {} silent chunks", self.silence_run);
                return PhraseProgress::Complete(EndOfPhrase::Silence);
            }
        } else {
            self.silence_run = 0;
        }

        PhraseProgress::Recording
    }

    /// Persist the accumulated phrase as a WAV artifact and reset.
    ///
    /// The phrase state is cleared whether or not the write succeeds; a
    /// failed write loses the phrase but leaves the recorder usable.
    pub fn finalize(&mut self) -> Result<PathBuf, StorageError> {
        let frames = std::mem::take(&mut self.frames);
        self.reset_counters();

        std::fs::create_dir_all(&self.config.save_dir).map_err(|source| {
            StorageError::CreateDir {
                path: self.config.save_dir.clone(),
                source,
            }
        })?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        self.seq += 1;
        let path = self
            .config
            .save_dir
            .join(format!("phrase-{}-{:03}.wav", timestamp, self.seq));

        let spec = hound::WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)?;
        for pair in frames.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;

        debug!("finished saving: {}", path.display());
        Ok(path)
    }

    /// Whether voice onset has been heard for the current phrase.
    pub fn has_voice(&self) -> bool {
        self.voice_detected
    }

    /// Bytes accumulated for the current phrase.
    pub fn recorded_bytes(&self) -> usize {
        self.frames.len()
    }

    fn reset_counters(&mut self) {
        self.voice_detected = false;
        self.silence_run = 0;
        self.active_chunks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    // 1024 frames at 16kHz, so one chunk is 64ms.
    fn voice_chunk() -> Vec<u8> {
        encode(&vec![4000; 1024])
    }

    fn quiet_chunk() -> Vec<u8> {
        encode(&vec![0; 1024])
    }

    fn test_recorder(save_dir: PathBuf) -> PhraseRecorder {
        // silence limit = 0.256 * 16000 / 1024 = 4 chunks
        // cap = 1.28 * 16000 / 1024 = 20 chunks
        let config = RecorderConfig {
            silence_threshold: 1500.0,
            silence_secs: 0.256,
            max_phrase_secs: 1.28,
            chunk_frames: 1024,
            save_dir,
        };
        PhraseRecorder::new(config, AudioFormat::default()).unwrap()
    }

    #[test]
    fn test_chunks_before_onset_are_dropped() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        for _ in 0..5 {
            assert_eq!(recorder.append(&quiet_chunk()), PhraseProgress::AwaitingVoice);
        }
        assert!(!recorder.has_voice());
        assert_eq!(recorder.recorded_bytes(), 0);
    }

    #[test]
    fn test_silence_ends_phrase() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        assert_eq!(recorder.append(&voice_chunk()), PhraseProgress::Recording);

        // Four silent chunks reach the limit, the fifth exceeds it.
        for _ in 0..4 {
            assert_eq!(recorder.append(&quiet_chunk()), PhraseProgress::Recording);
        }
        assert_eq!(
            recorder.append(&quiet_chunk()),
            PhraseProgress::Complete(EndOfPhrase::Silence)
        );

        // Onset chunk plus all five silent chunks were kept.
        assert_eq!(recorder.recorded_bytes(), 6 * 2048);
    }

    #[test]
    fn test_voice_resets_silence_run() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        recorder.append(&voice_chunk());
        for _ in 0..4 {
            assert_eq!(recorder.append(&quiet_chunk()), PhraseProgress::Recording);
        }
        // Renewed voice clears the run; silence must start over.
        assert_eq!(recorder.append(&voice_chunk()), PhraseProgress::Recording);
        for _ in 0..4 {
            assert_eq!(recorder.append(&quiet_chunk()), PhraseProgress::Recording);
        }
        assert_eq!(
            recorder.append(&quiet_chunk()),
            PhraseProgress::Complete(EndOfPhrase::Silence)
        );
    }

    #[test]
    fn test_cap_forces_finalize_mid_phrase() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        let mut progress = recorder.append(&voice_chunk());
        let mut fed = 1;
        while progress == PhraseProgress::Recording {
            progress = recorder.append(&voice_chunk());
            fed += 1;
        }

        assert_eq!(progress, PhraseProgress::Complete(EndOfPhrase::MaxDuration));
        // Cap is 20 chunks; the 21st trips it and is still kept.
        assert_eq!(fed, 21);
        assert_eq!(recorder.recorded_bytes(), 21 * 2048);
    }

    #[test]
    fn test_cap_abandons_without_onset() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        for _ in 0..20 {
            assert_eq!(recorder.append(&quiet_chunk()), PhraseProgress::AwaitingVoice);
        }
        assert_eq!(recorder.append(&quiet_chunk()), PhraseProgress::Abandoned);
        assert_eq!(recorder.recorded_bytes(), 0);

        // The recorder is immediately reusable.
        assert_eq!(recorder.append(&voice_chunk()), PhraseProgress::Recording);
    }

    #[test]
    fn test_finalize_writes_wav() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        recorder.append(&voice_chunk());
        for _ in 0..5 {
            recorder.append(&quiet_chunk());
        }

        let path = recorder.finalize().unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("phrase-"));
        assert!(name.ends_with(".wav"));

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 6 * 1024);

        // Finalize resets the phrase.
        assert_eq!(recorder.recorded_bytes(), 0);
        assert!(!recorder.has_voice());
    }

    #[test]
    fn test_artifact_contents_match_recording() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());
        recorder.start();

        recorder.append(&encode(&vec![7000; 1024]));
        for _ in 0..5 {
            recorder.append(&quiet_chunk());
        }

        let path = recorder.finalize().unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();

        assert_eq!(&samples[..1024], vec![7000; 1024].as_slice());
        assert!(samples[1024..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_sequence_avoids_same_second_collisions() {
        let dir = tempdir().unwrap();
        let mut recorder = test_recorder(dir.path().to_path_buf());

        let mut paths = Vec::new();
        for _ in 0..3 {
            recorder.start();
            recorder.append(&voice_chunk());
            for _ in 0..5 {
                recorder.append(&quiet_chunk());
            }
            paths.push(recorder.finalize().unwrap());
        }

        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_storage_failure_leaves_recorder_usable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"occupied").unwrap();

        let mut recorder = test_recorder(blocker.join("phrases"));
        recorder.start();
        recorder.append(&voice_chunk());

        let result = recorder.finalize();
        assert!(matches!(result, Err(StorageError::CreateDir { .. })));

        // The lost phrase is gone and a new one can start cleanly.
        assert_eq!(recorder.recorded_bytes(), 0);
        assert!(!recorder.has_voice());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RecorderConfig::default();
        assert!(config.validate().is_ok());

        config.silence_secs = 0.0;
        assert!(config.validate().is_err());

        config.silence_secs = 4.0;
        config.chunk_frames = 0;
        assert!(config.validate().is_err());
    }
}
