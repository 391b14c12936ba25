//! Request and response bodies shared by the gateway and its clients

use serde::{Deserialize, Serialize};

use crate::providers::types::ChatMessage;

/// Body of `POST /api/chat` and the backup route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Model identifier; an absent model falls through to the default route
    #[serde(default)]
    pub model: String,
}

/// Body of `POST /api/chat/v3`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionRequest {
    /// The text prompt (a single string, despite the name)
    pub messages: String,
    pub image_url: String,
}

/// Successful reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Error envelope returned with every non-2xx status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Route paths
pub mod routes {
    pub const ROOT: &str = "/";
    pub const CHAT: &str = "/api/chat";
    pub const CHAT_BACKUP: &str = "/api/chat/v2";
    pub const CHAT_VISION: &str = "/api/chat/v3";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::ChatRole;

    #[test]
    fn test_chat_request_parses() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"messages":[{"role":"system","content":""},{"role":"user","content":"hi"}],"model":"gpt-4o"}"#,
        )
        .unwrap();
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].role, ChatRole::User);
    }

    #[test]
    fn test_chat_request_model_optional() {
        let req: ChatRequest = serde_json::from_str(r#"{"messages":[]}"#).unwrap();
        assert!(req.model.is_empty());
    }

    #[test]
    fn test_reply_and_error_shapes() {
        assert_eq!(
            serde_json::to_value(ChatReply {
                response: "ok".to_string()
            })
            .unwrap(),
            serde_json::json!({"response": "ok"})
        );
        assert_eq!(
            serde_json::to_value(ErrorBody {
                error: "nope".to_string()
            })
            .unwrap(),
            serde_json::json!({"error": "nope"})
        );
    }
}
