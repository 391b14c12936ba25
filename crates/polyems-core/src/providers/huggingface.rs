//! HuggingFace inference provider with streamed chat completions
//!
//! The upstream is asked for an SSE stream which is drained to completion
//! before the reply is returned; callers never see partial output.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::stream::{drain_fragments, sse_fragments};

use super::openai::CompletionRequest;
use super::types::{ChatMessage, LlmProvider, SamplingParams};

/// HuggingFace's OpenAI-compatible inference router
pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/v1";

pub struct HuggingFaceProvider {
    client: Client,
    api_key: String,
    base_url: String,
    /// Repository id sent upstream, e.g. `Qwen/Qwen2.5-Coder-32B-Instruct`
    upstream_model: String,
    sampling: SamplingParams,
}

impl std::fmt::Debug for HuggingFaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceProvider")
            .field("base_url", &self.base_url)
            .field("upstream_model", &self.upstream_model)
            .field("sampling", &self.sampling)
            .finish()
    }
}

impl HuggingFaceProvider {
    pub fn new(
        client: Client,
        api_key: String,
        base_url: String,
        upstream_model: String,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            upstream_model,
            sampling,
        }
    }

    pub fn upstream_model(&self) -> &str {
        &self.upstream_model
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    fn provider_name(&self) -> &str {
        "huggingface"
    }

    async fn generate_reply(&self, model: &str, conversation: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: &self.upstream_model,
            messages: conversation,
            sampling: self.sampling,
            stream: true,
        };

        debug!(
            "HuggingFace stream request: model={} (upstream {}), messages={}",
            model,
            self.upstream_model,
            conversation.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to HuggingFace API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "HuggingFace API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let reply = drain_fragments(sse_fragments(response.bytes_stream())).await?;
        debug!("HuggingFace stream drained: {} bytes", reply.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::NO_RESPONSE;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> HuggingFaceProvider {
        HuggingFaceProvider::new(
            Client::new(),
            "hf_secret".to_string(),
            base_url.to_string(),
            "Qwen/Qwen2.5-Coder-32B-Instruct".to_string(),
            SamplingParams::coder(),
        )
    }

    fn sse(events: &[&str]) -> String {
        let mut body = String::new();
        for content in events {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"delta": {"content": content}}]})
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn test_stream_is_drained_and_concatenated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer hf_secret"))
            .and(body_partial_json(json!({
                "model": "Qwen/Qwen2.5-Coder-32B-Instruct",
                "stream": true,
                "top_p": 0.7,
                "max_tokens": 1024
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse(&["fn ", "main", "() {}"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = provider(&server.uri())
            .generate_reply("Qwen2.5-Coder-32B-Instruct", &[ChatMessage::user("write main")])
            .await
            .unwrap();
        assert_eq!(reply, "fn main() {}");
    }

    #[tokio::test]
    async fn test_empty_stream_yields_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse(&[])),
            )
            .mount(&server)
            .await;

        let reply = provider(&server.uri())
            .generate_reply("Qwen2.5-Coder-32B-Instruct", &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, NO_RESPONSE);
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate_reply("Qwen2.5-Coder-32B-Instruct", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    async fn reply_for_stream(body: &str) -> Result<String> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .mount(&server)
            .await;

        provider(&server.uri())
            .generate_reply("Qwen2.5-Coder-32B-Instruct", &[ChatMessage::user("hi")])
            .await
    }

    #[tokio::test]
    async fn test_error_event_in_ok_stream_fails() {
        let err = reply_for_stream("data: {\"error\":\"Model too busy\"}\n\n")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Model too busy"));
    }

    #[tokio::test]
    async fn test_truncated_stream_fails() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n",
            "data: {\"choices\":[{\"del",
        );
        assert!(reply_for_stream(body).await.is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", provider(DEFAULT_BASE_URL));
        assert!(!debug.contains("hf_secret"));
        assert!(debug.contains("Qwen/Qwen2.5-Coder-32B-Instruct"));
    }
}
