//! Agent configuration loaded from a YAML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a working offline agent with the mock recognizer and the echo backend.

use hotword_listener::{AudioFormat, RecorderConfig, ScorerConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub detector: DetectorSection,
    pub asr: AsrSection,
    pub chat: ChatSection,
}

impl AgentConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yaml::from_str(&raw).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Detector tuning, converted into the listener's config structs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// Keyword model files; empty means one implicit hotword.
    pub model_paths: Vec<String>,

    /// Per-hotword sensitivity; a single value is broadcast.
    pub sensitivity: Vec<f32>,

    /// Input volume multiplier.
    pub audio_gain: f32,

    /// Apply DC-removal preprocessing before scoring.
    pub apply_frontend: bool,

    pub channels: u16,
    pub sample_rate: u32,

    /// Frames per processed chunk.
    pub chunk_frames: usize,

    /// RMS amplitude separating silence from voice while recording.
    pub silence_threshold: f32,

    /// Seconds of sustained silence that end a phrase.
    pub silence_secs: f32,

    /// Hard cap on a single phrase recording.
    pub max_phrase_secs: f32,

    /// Seconds of audio the ring buffer window retains.
    pub window_seconds: usize,

    /// Poll tick when the ring buffer is empty, in milliseconds.
    pub sleep_ms: u64,

    /// Directory phrase artifacts are written to; temp dir when unset.
    pub save_dir: Option<PathBuf>,

    /// WAV file played when a keyword fires; silent when unset.
    pub chime_path: Option<PathBuf>,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            model_paths: Vec::new(),
            sensitivity: Vec::new(),
            audio_gain: 1.0,
            apply_frontend: false,
            channels: 1,
            sample_rate: 16000,
            chunk_frames: 1024,
            silence_threshold: 1500.0,
            silence_secs: 4.0,
            max_phrase_secs: 15.0,
            window_seconds: 5,
            sleep_ms: 30,
            save_dir: None,
            chime_path: None,
        }
    }
}

impl DetectorSection {
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            channels: self.channels,
            sample_rate: self.sample_rate,
            ..Default::default()
        }
    }

    pub fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            model_paths: self.model_paths.clone(),
            sensitivity: self.sensitivity.clone(),
            audio_gain: self.audio_gain,
            apply_frontend: self.apply_frontend,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        let mut config = RecorderConfig {
            silence_threshold: self.silence_threshold,
            silence_secs: self.silence_secs,
            max_phrase_secs: self.max_phrase_secs,
            chunk_frames: self.chunk_frames,
            ..Default::default()
        };
        if let Some(dir) = &self.save_dir {
            config.save_dir = dir.clone();
        }
        config
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sleep_time: Duration::from_millis(self.sleep_ms),
            window_seconds: self.window_seconds,
        }
    }
}

/// ASR engine selection plus its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrSection {
    /// Engine slug, e.g. "whisper_api", "deepgram", "mock".
    pub slug: String,

    /// API key; falls back to the engine's environment variable.
    pub api_key: String,

    /// Model name; each engine has its own default.
    pub model: String,
}

impl Default for AsrSection {
    fn default() -> Self {
        Self {
            slug: "mock".to_string(),
            api_key: String::new(),
            model: String::new(),
        }
    }
}

/// Chat backend selection plus its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// Backend slug, e.g. "gpt", "echo".
    pub slug: String,

    /// API key; falls back to the backend's environment variable.
    pub api_key: String,

    pub model: String,

    /// Optional system prompt prepended to every request.
    pub system_prompt: Option<String>,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            slug: "echo".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: None,
        }
    }
}

/// Configured key if present, otherwise the named environment variable.
pub(crate) fn resolve_key(configured: &str, env_name: &str) -> Option<String> {
    if !configured.is_empty() {
        return Some(configured.to_string());
    }
    std::env::var(env_name).ok().filter(|v| !v.is_empty())
}
