//! Google Gemini provider

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{ChatMessage, LlmProvider, SamplingParams, or_placeholder};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the candidate text cannot be used
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "LANGUAGE"];

/// Google Gemini provider
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    sampling: SamplingParams,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("base_url", &self.base_url)
            .field("sampling", &self.sampling)
            .finish()
    }
}

impl GoogleProvider {
    /// Gemini requests go out without sampling overrides unless `sampling` sets some.
    pub fn new(client: Client, api_key: String, base_url: String, sampling: SamplingParams) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            sampling,
        }
    }

    /// Flatten the conversation into a single prompt.
    ///
    /// Roles are dropped; contents are joined with newlines in order.
    pub fn flatten_prompt(conversation: &[ChatMessage]) -> String {
        conversation
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn request_body(&self, prompt: &str) -> GeminiRequest {
        let generation_config = if self.sampling.is_empty() {
            None
        } else {
            Some(GeminiGenerationConfig {
                temperature: self.sampling.temperature,
                top_p: self.sampling.top_p,
                max_output_tokens: self.sampling.max_tokens,
            })
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config,
        }
    }

    /// Concatenate the text parts of the first candidate.
    ///
    /// A blocked prompt or a candidate stopped for safety/recitation is an
    /// error. No candidates at all yields the placeholder.
    fn reply_text(resp: GeminiApiResponse) -> Result<String> {
        let Some(candidate) = resp.candidates.into_iter().next() else {
            if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(anyhow!("Gemini blocked the prompt: {}", reason));
            }
            return Ok(or_placeholder(""));
        };

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKED_FINISH_REASONS.contains(&reason) {
                return Err(anyhow!("Gemini stopped the response: {}", reason));
            }
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(or_placeholder(text))
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
    }

    async fn generate_reply(&self, model: &str, conversation: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let prompt = Self::flatten_prompt(conversation);
        let body = self.request_body(&prompt);

        debug!(
            "Gemini request: model={}, prompt_chars={}",
            model,
            prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Gemini API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: GeminiApiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        debug!(
            "Gemini response: candidates={}",
            api_response.candidates.len()
        );

        Self::reply_text(api_response)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}
