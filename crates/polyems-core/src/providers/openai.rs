//! OpenAI chat-completions provider (GPT-4o and friends)

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{
    ChatMessage, LlmProvider, SamplingParams, VisionProvider, or_placeholder,
};

/// Endpoint the GPT models are served from by default
pub const DEFAULT_BASE_URL: &str = "https://models.inference.ai.azure.com";

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    sampling: SamplingParams,
    vision_sampling: SamplingParams,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("sampling", &self.sampling)
            .finish()
    }
}

impl OpenAiProvider {
    /// `base_url` is everything before `/chat/completions`
    /// (e.g. `https://api.groq.com/openai/v1`).
    pub fn new(client: Client, api_key: String, base_url: String, sampling: SamplingParams) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            sampling,
            vision_sampling: SamplingParams::vision(),
        }
    }

    /// Sampling used for image-augmented requests
    pub fn with_vision_sampling(mut self, sampling: SamplingParams) -> Self {
        self.vision_sampling = sampling;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// POST a non-streaming completion request and return the first choice's text
    async fn complete<M: Serialize + Sync>(
        &self,
        label: &str,
        request: &CompletionRequest<'_, M>,
    ) -> Result<String> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} API", label))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "{} API request failed with status {}: {}",
                label,
                status,
                error_text
            ));
        }

        let api_response: CompletionResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} API response", label))?;

        debug!(
            "{} response: choices={}, finish_reason={:?}",
            label,
            api_response.choices.len(),
            api_response.choices.first().and_then(|c| c.finish_reason.as_deref())
        );

        Ok(Self::reply_text(api_response))
    }

    /// First choice's content, or the placeholder when there is none
    fn reply_text(resp: CompletionResponse) -> String {
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        or_placeholder(content)
    }

    pub(crate) async fn chat_as(
        &self,
        label: &str,
        model: &str,
        conversation: &[ChatMessage],
    ) -> Result<String> {
        debug!(
            "{} request: model={}, messages={}",
            label,
            model,
            conversation.len()
        );
        let request = CompletionRequest {
            model,
            messages: conversation,
            sampling: self.sampling,
            stream: false,
        };
        self.complete(label, &request).await
    }

    pub(crate) async fn describe_image_as(
        &self,
        label: &str,
        model: &str,
        prompt: &str,
        image_url: &str,
    ) -> Result<String> {
        debug!("{} vision request: model={}", label, model);
        let messages = [VisionMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image_url },
                },
            ],
        }];
        let request = CompletionRequest {
            model,
            messages: &messages,
            sampling: self.vision_sampling,
            stream: false,
        };
        self.complete(label, &request).await
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn generate_reply(&self, model: &str, conversation: &[ChatMessage]) -> Result<String> {
        self.chat_as("OpenAI", model, conversation).await
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn describe_image(&self, model: &str, prompt: &str, image_url: &str) -> Result<String> {
        self.describe_image_as("OpenAI", model, prompt, image_url).await
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a, M> {
    pub model: &'a str,
    pub messages: &'a [M],
    #[serde(flatten)]
    pub sampling: SamplingParams,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
struct VisionMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}
