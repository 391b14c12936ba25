//! polyems-core - provider adapters and routing for the PolyEms gateway
//!
//! This crate provides:
//! - Provider-agnostic chat types and the [`LlmProvider`] capability
//! - Adapters for Gemini, OpenAI, HuggingFace (streamed) and OpenAI-compatible APIs
//! - The ordered model-name dispatch table used by the gateway
//! - SSE parsing with a drain-to-completion combinator
//! - The JSON bodies exchanged between gateway and client

pub mod protocol;
pub mod providers;
pub mod stream;

// Re-export main types for convenience
pub use providers::{
    ChatMessage, ChatRole, LlmProvider, ModelRouter, NO_RESPONSE, ProviderKind, ProviderSet,
    RouteError, RoutingTable, SamplingParams, VisionProvider,
};
pub use protocol::{ChatReply, ChatRequest, ErrorBody, VisionRequest};
pub use stream::{drain_fragments, sse_fragments};
