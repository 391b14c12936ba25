//! Model router: picks one provider per request from an ordered rule table

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use super::types::{ChatMessage, LlmProvider};

/// Model name served by the streaming HuggingFace route
pub const DEFAULT_CODER_MODEL: &str = "Qwen2.5-Coder-32B-Instruct";

/// The closed set of provider routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    HuggingFace,
    Default,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
            Self::HuggingFace => write!(f, "huggingface"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// How a rule matches a model identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelMatch {
    Prefix(String),
    Exact(String),
}

impl ModelMatch {
    pub fn matches(&self, model: &str) -> bool {
        match self {
            Self::Prefix(p) => model.starts_with(p.as_str()),
            Self::Exact(e) => model == e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub matcher: ModelMatch,
    pub kind: ProviderKind,
}

/// Ordered dispatch rules; the first match wins, otherwise `fallback`
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<RouteRule>,
    fallback: ProviderKind,
}

impl RoutingTable {
    pub fn new(rules: Vec<RouteRule>, fallback: ProviderKind) -> Self {
        Self { rules, fallback }
    }

    /// `gemini*` → Gemini, `gpt*` → OpenAI, exact `coder_model` → HuggingFace,
    /// anything else → the default provider.
    pub fn standard(coder_model: impl Into<String>) -> Self {
        Self::new(
            vec![
                RouteRule {
                    matcher: ModelMatch::Prefix("gemini".to_string()),
                    kind: ProviderKind::Gemini,
                },
                RouteRule {
                    matcher: ModelMatch::Prefix("gpt".to_string()),
                    kind: ProviderKind::OpenAi,
                },
                RouteRule {
                    matcher: ModelMatch::Exact(coder_model.into()),
                    kind: ProviderKind::HuggingFace,
                },
            ],
            ProviderKind::Default,
        )
    }

    pub fn select(&self, model: &str) -> ProviderKind {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(model))
            .map_or(self.fallback, |rule| rule.kind)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::standard(DEFAULT_CODER_MODEL)
    }
}

/// One provider handle per route, constructed once at startup
#[derive(Clone)]
pub struct ProviderSet {
    pub gemini: Arc<dyn LlmProvider>,
    pub openai: Arc<dyn LlmProvider>,
    pub huggingface: Arc<dyn LlmProvider>,
    pub default: Arc<dyn LlmProvider>,
}

impl ProviderSet {
    pub fn get(&self, kind: ProviderKind) -> &Arc<dyn LlmProvider> {
        match kind {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::HuggingFace => &self.huggingface,
            ProviderKind::Default => &self.default,
        }
    }
}

/// A provider call failed. The display text is safe to show to callers;
/// the upstream detail is kept in `source`.
#[derive(Debug, Error)]
#[error("Model {model} is currently unreachable. Please try a different model.")]
pub struct RouteError {
    pub model: String,
    pub provider: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

/// Routes each request to exactly one provider. No retries happen here.
#[derive(Clone)]
pub struct ModelRouter {
    table: RoutingTable,
    providers: ProviderSet,
}

impl ModelRouter {
    pub fn new(table: RoutingTable, providers: ProviderSet) -> Self {
        Self { table, providers }
    }

    pub fn select(&self, model: &str) -> ProviderKind {
        self.table.select(model)
    }

    /// Dispatch by model name and return the reply text
    pub async fn chat(&self, conversation: &[ChatMessage], model: &str) -> Result<String, RouteError> {
        let kind = self.select(model);
        self.chat_via(kind, conversation, model).await
    }

    /// Send to a specific route, bypassing the rule table
    pub async fn chat_via(
        &self,
        kind: ProviderKind,
        conversation: &[ChatMessage],
        model: &str,
    ) -> Result<String, RouteError> {
        let provider = self.providers.get(kind);
        debug!(
            "Routing model '{}' to {} ({})",
            model,
            kind,
            provider.provider_name()
        );

        match provider.generate_reply(model, conversation).await {
            Ok(reply) => {
                info!(
                    "Provider {} answered for model '{}'",
                    provider.provider_name(),
                    model
                );
                Ok(reply)
            }
            Err(e) => {
                error!(
                    "Provider {} failed for model '{}': {:#}",
                    provider.provider_name(),
                    model,
                    e
                );
                Err(RouteError {
                    model: model.to_string(),
                    provider: provider.provider_name().to_string(),
                    source: e.into(),
                })
            }
        }
    }
}
