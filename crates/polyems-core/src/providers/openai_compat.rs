//! OpenAI-compatible provider for Groq, Together, LM Studio, etc.
//!
//! Reuses the OpenAI wire format with a configurable base URL. The gateway's
//! default route (and its vision route) run through Groq this way.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use super::openai::OpenAiProvider;
use super::types::{ChatMessage, LlmProvider, SamplingParams, VisionProvider};

/// Groq's OpenAI-compatible endpoint root
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// OpenAI-compatible provider: [`OpenAiProvider`] under a custom name
pub struct OpenAiCompatProvider {
    inner: OpenAiProvider,
    name: String,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// - `name`: human-readable label (e.g. "groq", "together")
    /// - `base_url`: the endpoint root (e.g. `https://api.groq.com/openai/v1`)
    pub fn new(
        client: Client,
        name: String,
        api_key: String,
        base_url: String,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            inner: OpenAiProvider::new(client, api_key, base_url, sampling),
            name,
        }
    }

    pub fn with_vision_sampling(mut self, sampling: SamplingParams) -> Self {
        self.inner = self.inner.with_vision_sampling(sampling);
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn generate_reply(&self, model: &str, conversation: &[ChatMessage]) -> Result<String> {
        self.inner.chat_as(&self.name, model, conversation).await
    }
}

#[async_trait]
impl VisionProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn describe_image(&self, model: &str, prompt: &str, image_url: &str) -> Result<String> {
        self.inner
            .describe_image_as(&self.name, model, prompt, image_url)
            .await
    }
}
