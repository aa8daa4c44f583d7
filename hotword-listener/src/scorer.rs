/// Keyword scoring boundary.
///
/// The session consumes keyword detection through the [`KeywordScorer`]
/// trait and stays agnostic of the engine behind it. The built-in
/// [`EnergyScorer`] is an energy heuristic standing in for a trained
/// keyword model so the binaries run without a proprietary SDK.

use crate::vad;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("number of hotwords ({hotwords}) does not match the number of sensitivity values ({given})")]
    SensitivityCount { hotwords: usize, given: usize },

    #[error("number of hotwords ({hotwords}) does not match the number of detected callbacks ({given})")]
    CallbackCount { hotwords: usize, given: usize },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Classification of one audio chunk.
///
/// Raw values follow the integer convention trained keyword decoders
/// speak: -2 silence, -1 error, 0 voice, >=1 the 1-based hotword index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    Silence,
    Error,
    Voice,
    Keyword(usize),
}

impl DetectionStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -2 => Self::Silence,
            0 => Self::Voice,
            index if index >= 1 => Self::Keyword(index as usize),
            _ => Self::Error,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Silence => -2,
            Self::Error => -1,
            Self::Voice => 0,
            Self::Keyword(index) => index as i32,
        }
    }
}

/// PCM format a scorer expects on its input.
///
/// The audio input is configured from the scorer's format, never the
/// reverse: the model dictates what it can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
        }
    }
}

impl AudioFormat {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::Invalid(
                "channel count must be at least 1".to_string(),
            ));
        }

        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "sample rate must be greater than 0".to_string(),
            ));
        }

        // The whole pipeline (RMS math, WAV artifacts) is 16-bit PCM.
        if self.bits_per_sample != 16 {
            return Err(ConfigError::Invalid(format!(
                "bits per sample must be 16, got {}",
                self.bits_per_sample
            )));
        }

        Ok(())
    }

    /// Bytes occupied by one frame across all channels.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Scorer configuration: model identifiers plus tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Paths to keyword model files. Empty means one implicit hotword.
    pub model_paths: Vec<String>,

    /// Per-hotword sensitivity in 0.0..=1.0. A single value is broadcast
    /// across all hotwords; empty keeps the model defaults.
    pub sensitivity: Vec<f32>,

    /// Input volume multiplier applied before classification.
    pub audio_gain: f32,

    /// Apply frontend preprocessing (DC removal) before scoring.
    pub apply_frontend: bool,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model_paths: Vec::new(),
            sensitivity: Vec::new(),
            audio_gain: 1.0,
            apply_frontend: false,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.audio_gain.is_finite() || self.audio_gain <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "audio gain must be positive, got {}",
                self.audio_gain
            )));
        }

        for &value in &self.sensitivity {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "sensitivity must be between 0.0 and 1.0, got {}",
                    value
                )));
            }
        }

        Ok(())
    }

    /// Resolve the sensitivity list against the hotword count.
    ///
    /// A single value given for several hotwords is broadcast to all of
    /// them; any other count mismatch is a configuration error. An empty
    /// list stays empty (model defaults).
    pub fn resolved_sensitivity(&self, num_hotwords: usize) -> Result<Vec<f32>, ConfigError> {
        let mut sensitivity = self.sensitivity.clone();

        if sensitivity.len() == 1 && num_hotwords > 1 {
            sensitivity = vec![sensitivity[0]; num_hotwords];
        }

        if !sensitivity.is_empty() && sensitivity.len() != num_hotwords {
            return Err(ConfigError::SensitivityCount {
                hotwords: num_hotwords,
                given: self.sensitivity.len(),
            });
        }

        Ok(sensitivity)
    }
}

/// Classifies raw PCM chunks into silence, voice, or a detected keyword.
#[cfg_attr(test, mockall::automock)]
pub trait KeywordScorer: Send {
    /// Classify one drained chunk. Called for every chunk the session
    /// pulls from the ring buffer, in both PASSIVE and ACTIVE state.
    fn classify(&mut self, chunk: &[u8]) -> DetectionStatus;

    /// Number of hotwords this scorer can report, at least 1.
    fn num_hotwords(&self) -> usize;

    /// PCM format the scorer expects.
    fn format(&self) -> AudioFormat;
}

/// Energy floor below which a chunk reads as silence, in RMS amplitude.
pub const VOICE_FLOOR_RMS: f32 = 450.0;

/// Trigger level at the neutral sensitivity of 0.5.
const BASE_TRIGGER_RMS: f32 = 6000.0;

/// Consecutive chunks above the trigger level needed to fire a keyword.
const TRIGGER_CHUNKS: u32 = 3;

/// Chunks to ignore after a keyword fires before the next one may.
const COOLDOWN_CHUNKS: u32 = 20;

/// Energy-based keyword scorer.
///
/// Reports a keyword after a sustained burst of loud audio. It cannot tell
/// hotwords apart, so it always fires index 1; the configured model paths
/// only set the hotword count. Sensitivity scales the trigger level and
/// `audio_gain` scales the measured energy, mirroring what a trained
/// decoder does with the same knobs.
pub struct EnergyScorer {
    config: ScorerConfig,
    format: AudioFormat,
    num_hotwords: usize,
    trigger_rms: f32,
    loud_run: u32,
    cooldown: u32,
}

impl EnergyScorer {
    pub fn new(config: ScorerConfig, format: AudioFormat) -> Result<Self, ConfigError> {
        config.validate()?;
        format.validate()?;

        let num_hotwords = config.model_paths.len().max(1);
        let resolved = config.resolved_sensitivity(num_hotwords)?;
        let sensitivity = resolved.first().copied().unwrap_or(0.5);

        for path in &config.model_paths {
            if !Path::new(path).exists() {
                // The heuristic never reads the model file; detection still works.
                warn!("model file not found: {}", path);
            }
        }

        // Higher sensitivity lowers the bar; 0.5 keeps the base level.
        let trigger_rms = BASE_TRIGGER_RMS * 2.0 * (1.0 - sensitivity);

        debug!(
            "energy scorer ready: {} hotword(s), trigger rms {:.0}, gain {}",
            num_hotwords, trigger_rms, config.audio_gain
        );

        Ok(Self {
            config,
            format,
            num_hotwords,
            trigger_rms,
            loud_run: 0,
            cooldown: 0,
        })
    }
}

impl KeywordScorer for EnergyScorer {
    fn classify(&mut self, chunk: &[u8]) -> DetectionStatus {
        let energy = if self.config.apply_frontend {
            vad::rms_centered(chunk)
        } else {
            vad::rms(chunk)
        };

        let Some(energy) = energy else {
            return DetectionStatus::Error;
        };
        let energy = energy * self.config.audio_gain;

        if self.cooldown > 0 {
            self.cooldown -= 1;
        }

        if energy <= VOICE_FLOOR_RMS {
            self.loud_run = 0;
            return DetectionStatus::Silence;
        }

        if energy > self.trigger_rms {
            self.loud_run += 1;
        } else {
            self.loud_run = 0;
        }

        if self.loud_run >= TRIGGER_CHUNKS && self.cooldown == 0 {
            self.loud_run = 0;
            self.cooldown = COOLDOWN_CHUNKS;
            return DetectionStatus::Keyword(1);
        }

        DetectionStatus::Voice
    }

    fn num_hotwords(&self) -> usize {
        self.num_hotwords
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn chunk_at(amplitude: i16) -> Vec<u8> {
        encode(&vec![amplitude; 512])
    }

    #[test]
    fn test_status_raw_mapping() {
        assert_eq!(DetectionStatus::from_raw(-2), DetectionStatus::Silence);
        assert_eq!(DetectionStatus::from_raw(-1), DetectionStatus::Error);
        assert_eq!(DetectionStatus::from_raw(0), DetectionStatus::Voice);
        assert_eq!(DetectionStatus::from_raw(1), DetectionStatus::Keyword(1));
        assert_eq!(DetectionStatus::from_raw(4), DetectionStatus::Keyword(4));
        // Anything below the protocol range reads as an error.
        assert_eq!(DetectionStatus::from_raw(-7), DetectionStatus::Error);

        assert_eq!(DetectionStatus::Keyword(2).as_raw(), 2);
        assert_eq!(DetectionStatus::Silence.as_raw(), -2);
        assert_eq!(DetectionStatus::Error.as_raw(), -1);
        assert_eq!(DetectionStatus::Voice.as_raw(), 0);
    }

    #[test_case(vec![], 2, Some(vec![]) ; "empty keeps model defaults")]
    #[test_case(vec![0.5], 1, Some(vec![0.5]) ; "single model single value")]
    #[test_case(vec![0.5], 3, Some(vec![0.5, 0.5, 0.5]) ; "single value broadcasts")]
    #[test_case(vec![0.4, 0.6], 2, Some(vec![0.4, 0.6]) ; "matched counts pass")]
    #[test_case(vec![0.5, 0.5], 3, None ; "two values for three hotwords fail")]
    fn test_sensitivity_broadcast(
        sensitivity: Vec<f32>,
        hotwords: usize,
        expected: Option<Vec<f32>>,
    ) {
        let config = ScorerConfig {
            sensitivity,
            ..Default::default()
        };

        match expected {
            Some(values) => assert_eq!(config.resolved_sensitivity(hotwords).unwrap(), values),
            None => assert!(matches!(
                config.resolved_sensitivity(hotwords),
                Err(ConfigError::SensitivityCount { .. })
            )),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScorerConfig::default();
        assert!(config.validate().is_ok());

        config.audio_gain = 0.0;
        assert!(config.validate().is_err());

        config.audio_gain = 1.0;
        config.sensitivity = vec![1.5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_validation() {
        assert!(AudioFormat::default().validate().is_ok());

        let bad_channels = AudioFormat {
            channels: 0,
            ..Default::default()
        };
        assert!(bad_channels.validate().is_err());

        let bad_depth = AudioFormat {
            bits_per_sample: 8,
            ..Default::default()
        };
        assert!(bad_depth.validate().is_err());
    }

    #[test]
    fn test_scorer_fires_after_sustained_burst() {
        let mut scorer = EnergyScorer::new(ScorerConfig::default(), AudioFormat::default()).unwrap();

        assert_eq!(scorer.classify(&chunk_at(0)), DetectionStatus::Silence);
        assert_eq!(scorer.classify(&chunk_at(2000)), DetectionStatus::Voice);

        // Two loud chunks are not enough, the third fires.
        assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Voice);
        assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Voice);
        assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Keyword(1));
    }

    #[test]
    fn test_cooldown_suppresses_immediate_refire() {
        let mut scorer = EnergyScorer::new(ScorerConfig::default(), AudioFormat::default()).unwrap();

        for _ in 0..2 {
            scorer.classify(&chunk_at(12000));
        }
        assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Keyword(1));

        // Still shouting, but the cooldown holds the trigger closed.
        for _ in 0..10 {
            assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Voice);
        }
    }

    #[test]
    fn test_quiet_chunk_breaks_the_run() {
        let mut scorer = EnergyScorer::new(ScorerConfig::default(), AudioFormat::default()).unwrap();

        scorer.classify(&chunk_at(12000));
        scorer.classify(&chunk_at(12000));
        scorer.classify(&chunk_at(1000));
        // The run restarts; two more loud chunks stay below the trigger count.
        assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Voice);
        assert_eq!(scorer.classify(&chunk_at(12000)), DetectionStatus::Voice);
    }

    #[test]
    fn test_gain_scales_measured_energy() {
        let config = ScorerConfig {
            audio_gain: 20.0,
            ..Default::default()
        };
        let mut scorer = EnergyScorer::new(config, AudioFormat::default()).unwrap();

        // 100 RMS is silence at unit gain but voiced at 20x.
        assert_eq!(scorer.classify(&chunk_at(100)), DetectionStatus::Voice);

        let mut unity = EnergyScorer::new(ScorerConfig::default(), AudioFormat::default()).unwrap();
        assert_eq!(unity.classify(&chunk_at(100)), DetectionStatus::Silence);
    }

    #[test]
    fn test_undecodable_chunk_reports_error() {
        let mut scorer = EnergyScorer::new(ScorerConfig::default(), AudioFormat::default()).unwrap();
        assert_eq!(scorer.classify(&[1, 2, 3]), DetectionStatus::Error);
    }

    #[test]
    fn test_hotword_count_follows_models() {
        let config = ScorerConfig {
            model_paths: vec!["models/a.umdl".to_string(), "models/b.umdl".to_string()],
            ..Default::default()
        };
        let scorer = EnergyScorer::new(config, AudioFormat::default()).unwrap();
        assert_eq!(scorer.num_hotwords(), 2);

        let bare = EnergyScorer::new(ScorerConfig::default(), AudioFormat::default()).unwrap();
        assert_eq!(bare.num_hotwords(), 1);
    }

    #[test]
    fn test_sensitivity_mismatch_fails_construction() {
        let config = ScorerConfig {
            model_paths: vec![
                "a.umdl".to_string(),
                "b.umdl".to_string(),
                "c.umdl".to_string(),
            ],
            sensitivity: vec![0.5, 0.5],
            ..Default::default()
        };
        assert!(matches!(
            EnergyScorer::new(config, AudioFormat::default()),
            Err(ConfigError::SensitivityCount {
                hotwords: 3,
                given: 2
            })
        ));
    }
}
