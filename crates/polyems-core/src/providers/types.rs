//! Provider-agnostic types shared by every adapter

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reply substituted when an upstream returns no text at all
pub const NO_RESPONSE: &str = "No response generated.";

/// Provider-agnostic chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with a completion request.
///
/// Unset fields are omitted from the wire body so the upstream applies its
/// own defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SamplingParams {
    /// temperature 1, top_p 1, 1024 tokens
    pub const fn chat() -> Self {
        Self {
            temperature: Some(1.0),
            top_p: Some(1.0),
            max_tokens: Some(1024),
        }
    }

    /// temperature 1, top_p 0.7, 1024 tokens
    pub const fn coder() -> Self {
        Self {
            temperature: Some(1.0),
            top_p: Some(0.7),
            max_tokens: Some(1024),
        }
    }

    /// temperature 1, top_p 1, 2048 tokens
    pub const fn vision() -> Self {
        Self {
            temperature: Some(1.0),
            top_p: Some(1.0),
            max_tokens: Some(2048),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.max_tokens.is_none()
    }
}

/// One capability every chat provider implements: turn a conversation into text
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "groq", "google")
    fn provider_name(&self) -> &str;

    /// Send the conversation to `model` and return the reply text
    async fn generate_reply(&self, model: &str, conversation: &[ChatMessage]) -> Result<String>;
}

/// Providers that accept a text prompt plus an image reference
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn describe_image(&self, model: &str, prompt: &str, image_url: &str) -> Result<String>;
}

/// Replace an empty reply with [`NO_RESPONSE`]
pub fn or_placeholder(text: impl Into<String>) -> String {
    let text = text.into();
    if text.is_empty() {
        NO_RESPONSE.to_string()
    } else {
        text
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}
