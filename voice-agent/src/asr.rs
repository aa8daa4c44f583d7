//! Speech recognition engines.
//!
//! Every engine implements [`SpeechToText`] and is constructed through the
//! [`AsrRegistry`] by slug. Registration is explicit: a typo in the config
//! fails with the list of engines that actually exist.

use crate::config::{resolve_key, AsrSection};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AsrError {
    #[error("unknown ASR engine \"{slug}\" (available: {available})")]
    UnknownEngine { slug: String, available: String },

    #[error("ASR engine misconfigured: {0}")]
    Config(String),

    #[error("failed to read audio file {path}: {source}")]
    ReadAudio {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transcription API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Transcribes one recorded phrase artifact to text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, AsrError>;

    /// Engine slug, mostly for logs.
    fn slug(&self) -> &'static str;
}

impl std::fmt::Debug for dyn SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("slug", &self.slug())
            .finish()
    }
}

async fn read_artifact(path: &Path) -> Result<Vec<u8>, AsrError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| AsrError::ReadAudio {
            path: path.to_path_buf(),
            source,
        })
}

/// OpenAI Whisper transcription API.
pub struct WhisperApiAsr {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl WhisperApiAsr {
    pub const SLUG: &'static str = "whisper_api";

    pub fn new(section: &AsrSection) -> Result<Self, AsrError> {
        let api_key = resolve_key(&section.api_key, "OPENAI_API_KEY")
            .ok_or_else(|| AsrError::Config("OpenAI API key required for Whisper".to_string()))?;
        let model = if section.model.is_empty() {
            "whisper-1".to_string()
        } else {
            section.model.clone()
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl SpeechToText for WhisperApiAsr {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, AsrError> {
        let audio = read_artifact(audio_path).await?;
        debug!("transcribing {} bytes with {}", audio.len(), self.model);

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AsrError::Api { status, body });
        }

        #[derive(Deserialize)]
        struct WhisperResponse {
            text: String,
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    fn slug(&self) -> &'static str {
        Self::SLUG
    }
}

#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Deepgram transcription API.
pub struct DeepgramAsr {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl DeepgramAsr {
    pub const SLUG: &'static str = "deepgram";

    pub fn new(section: &AsrSection) -> Result<Self, AsrError> {
        let api_key = resolve_key(&section.api_key, "DEEPGRAM_API_KEY")
            .ok_or_else(|| AsrError::Config("Deepgram API key required".to_string()))?;
        let model = if section.model.is_empty() {
            "nova-2".to_string()
        } else {
            section.model.clone()
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl SpeechToText for DeepgramAsr {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, AsrError> {
        let audio = read_artifact(audio_path).await?;
        debug!("transcribing {} bytes with {}", audio.len(), self.model);

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AsrError::Api { status, body });
        }

        let result: DeepgramResponse = response.json().await?;
        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default();

        Ok(transcript)
    }

    fn slug(&self) -> &'static str {
        Self::SLUG
    }
}

/// Offline engine for development and tests: checks the artifact exists
/// and returns a fixed transcript.
pub struct MockAsr {
    transcript: String,
}

impl MockAsr {
    pub const SLUG: &'static str = "mock";

    pub fn new() -> Self {
        Self::with_transcript("hello")
    }

    pub fn with_transcript(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

impl Default for MockAsr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechToText for MockAsr {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, AsrError> {
        let meta = tokio::fs::metadata(audio_path)
            .await
            .map_err(|source| AsrError::ReadAudio {
                path: audio_path.to_path_buf(),
                source,
            })?;

        info!(
            "mock transcription of {} ({} bytes)",
            audio_path.display(),
            meta.len()
        );
        Ok(self.transcript.clone())
    }

    fn slug(&self) -> &'static str {
        Self::SLUG
    }
}

/// Builds one engine from its config section.
pub type AsrFactory = fn(&AsrSection) -> Result<Box<dyn SpeechToText>, AsrError>;

/// Explicit slug-to-constructor table for ASR engines.
pub struct AsrRegistry {
    factories: HashMap<&'static str, AsrFactory>,
}

impl AsrRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in engine.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(WhisperApiAsr::SLUG, |section| {
            Ok(Box::new(WhisperApiAsr::new(section)?))
        });
        registry.register(DeepgramAsr::SLUG, |section| {
            Ok(Box::new(DeepgramAsr::new(section)?))
        });
        registry.register(MockAsr::SLUG, |_| Ok(Box::new(MockAsr::new())));
        registry
    }

    pub fn register(&mut self, slug: &'static str, factory: AsrFactory) {
        self.factories.insert(slug, factory);
    }

    /// Build the engine named by the section's slug.
    pub fn create(&self, section: &AsrSection) -> Result<Box<dyn SpeechToText>, AsrError> {
        let factory =
            self.factories
                .get(section.slug.as_str())
                .ok_or_else(|| AsrError::UnknownEngine {
                    slug: section.slug.clone(),
                    available: self.slugs().join(", "),
                })?;
        factory(section)
    }

    pub fn slugs(&self) -> Vec<&'static str> {
        let mut slugs: Vec<_> = self.factories.keys().copied().collect();
        slugs.sort_unstable();
        slugs
    }
}

impl Default for AsrRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
