//! Chat backends that answer a transcribed phrase.
//!
//! Mirrors the ASR side: backends implement [`ChatBackend`] and are built
//! through the [`ChatRegistry`] by slug.

use crate::config::{resolve_key, ChatSection};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("unknown chat backend \"{slug}\" (available: {available})")]
    UnknownBackend { slug: String, available: String },

    #[error("chat backend misconfigured: {0}")]
    Config(String),

    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("chat API returned no choices")]
    EmptyResponse,
}

/// Produces a reply to one transcribed phrase.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, ChatError>;

    /// Backend slug, mostly for logs.
    fn slug(&self) -> &'static str;
}

impl std::fmt::Debug for dyn ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("slug", &self.slug())
            .finish()
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// OpenAI chat completions backend.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
}

impl OpenAiChat {
    pub const SLUG: &'static str = "gpt";

    pub fn new(section: &ChatSection) -> Result<Self, ChatError> {
        let api_key = resolve_key(&section.api_key, "OPENAI_API_KEY")
            .ok_or_else(|| ChatError::Config("OpenAI API key required for gpt".to_string()))?;
        let model = if section.model.is_empty() {
            "gpt-3.5-turbo".to_string()
        } else {
            section.model.clone()
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            system_prompt: section.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn reply(&self, prompt: &str) -> Result<String, ChatError> {
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };
        debug!("chat request to {}", self.model);

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ChatError::EmptyResponse)
    }

    fn slug(&self) -> &'static str {
        Self::SLUG
    }
}

/// Echoes the prompt back. Lets the whole pipeline run without any API
/// account, which is all the default config needs.
pub struct EchoChat;

impl EchoChat {
    pub const SLUG: &'static str = "echo";
}

#[async_trait]
impl ChatBackend for EchoChat {
    async fn reply(&self, prompt: &str) -> Result<String, ChatError> {
        Ok(prompt.to_string())
    }

    fn slug(&self) -> &'static str {
        Self::SLUG
    }
}

/// Builds one backend from its config section.
pub type ChatFactory = fn(&ChatSection) -> Result<Box<dyn ChatBackend>, ChatError>;

/// Explicit slug-to-constructor table for chat backends.
pub struct ChatRegistry {
    factories: HashMap<&'static str, ChatFactory>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in backend.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(OpenAiChat::SLUG, |section| {
            Ok(Box::new(OpenAiChat::new(section)?))
        });
        registry.register(EchoChat::SLUG, |_| Ok(Box::new(EchoChat)));
        registry
    }

    pub fn register(&mut self, slug: &'static str, factory: ChatFactory) {
        self.factories.insert(slug, factory);
    }

    /// Build the backend named by the section's slug.
    pub fn create(&self, section: &ChatSection) -> Result<Box<dyn ChatBackend>, ChatError> {
        let factory =
            self.factories
                .get(section.slug.as_str())
                .ok_or_else(|| ChatError::UnknownBackend {
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

impl Default for ChatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
