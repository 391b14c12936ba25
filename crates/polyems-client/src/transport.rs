//! HTTP transport to the gateway

use async_trait::async_trait;
use polyems_core::protocol::{ChatReply, ChatRequest, ErrorBody};
use reqwest::Client;
use tracing::debug;

use crate::error::ClientError;

/// Posts a chat payload to one gateway route and returns the reply text
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat(&self, route: &str, payload: &ChatRequest) -> Result<String, ClientError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, route: &str) -> String {
        if route.starts_with('/') {
            format!("{}{}", self.base_url, route)
        } else {
            format!("{}/{}", self.base_url, route)
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_chat(&self, route: &str, payload: &ChatRequest) -> Result<String, ClientError> {
        let url = self.url(route);
        debug!(
            "POST {} with {} messages for model '{}'",
            url,
            payload.messages.len(),
            payload.model
        );

        let response = self.client.post(&url).json(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ClientError::Status { status, message });
        }

        serde_json::from_str::<ChatReply>(&body)
            .map(|reply| reply.response)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}
