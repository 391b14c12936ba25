//! Multi-provider LLM abstraction layer
//!
//! Supports Google Gemini, OpenAI, HuggingFace inference (streamed) and any
//! OpenAI-compatible endpoint such as Groq. Providers implement [`LlmProvider`]
//! and are selected per request by [`ModelRouter`].

pub mod google;
pub mod huggingface;
pub mod openai;
pub mod openai_compat;
pub mod router;
pub mod types;

pub use router::{ModelRouter, ProviderKind, ProviderSet, RouteError, RoutingTable};
pub use types::{ChatMessage, ChatRole, LlmProvider, NO_RESPONSE, SamplingParams, VisionProvider};
