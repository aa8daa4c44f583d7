//! One turn of conversation: phrase artifact in, reply out.

use crate::asr::{AsrError, SpeechToText};
use crate::chat::{ChatBackend, ChatError};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConverseError {
    #[error(transparent)]
    Asr(#[from] AsrError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// The exchange produced from one recorded phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub transcript: String,
    pub reply: String,
}

/// Couples an ASR engine with a chat backend.
pub struct Conversation {
    asr: Box<dyn SpeechToText>,
    chat: Box<dyn ChatBackend>,
}

impl Conversation {
    pub fn new(asr: Box<dyn SpeechToText>, chat: Box<dyn ChatBackend>) -> Self {
        info!("conversation ready: asr={}, chat={}", asr.slug(), chat.slug());
        Self { asr, chat }
    }

    /// Transcribe one phrase artifact and answer it.
    ///
    /// Returns `Ok(None)` when the recognizer heard nothing worth
    /// answering, so breaths and stray noise never reach the backend.
    pub async fn converse(&self, audio_path: &Path) -> Result<Option<Exchange>, ConverseError> {
        let transcript = self.asr.transcribe(audio_path).await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            warn!("empty transcript for {}", audio_path.display());
            return Ok(None);
        }
        info!("ASR: {}", transcript);

        let reply = self.chat.reply(transcript).await?;
        info!("Chat: {}", reply);

        Ok(Some(Exchange {
            transcript: transcript.to_string(),
            reply,
        }))
    }
}
