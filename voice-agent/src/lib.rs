//! Voice assistant agent
//!
//! Ties the hotword listener to speech recognition and chat: the listener
//! records the phrase spoken after a keyword, an ASR engine transcribes
//! the artifact, and a chat backend answers the transcript. Engines and
//! backends are selected by slug from a YAML config file.

pub mod asr;
pub mod chat;
pub mod config;
pub mod conversation;

// Re-export main types
pub use asr::{AsrError, AsrRegistry, DeepgramAsr, MockAsr, SpeechToText, WhisperApiAsr};
pub use chat::{ChatBackend, ChatError, ChatRegistry, EchoChat, OpenAiChat};
pub use config::{AgentConfig, AsrSection, ChatSection, ConfigFileError, DetectorSection};
pub use conversation::{Conversation, ConverseError, Exchange};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
