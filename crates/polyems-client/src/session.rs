//! One chat session: visible transcript, selected model, and history context

use polyems_core::ChatMessage;
use polyems_core::protocol::ChatRequest;
use tracing::{debug, warn};

use crate::catalog::{self, DEFAULT_MODEL};
use crate::fallback::{FallbackController, Outcome};
use crate::history::{HistoryEntry, HistoryManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Bot,
}

/// A line in the visible transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptEntry {
    fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    fn bot(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Bot,
            text: text.into(),
        }
    }
}

pub struct ChatSession {
    controller: FallbackController,
    history: HistoryManager,
    system_prompt: String,
    model: String,
    transcript: Vec<TranscriptEntry>,
}

impl ChatSession {
    pub fn new(controller: FallbackController, history: HistoryManager) -> Self {
        Self {
            controller,
            history,
            system_prompt: String::new(),
            model: DEFAULT_MODEL.to_string(),
            transcript: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch models; returns the advisory notice for the new model, if any.
    /// Names outside the catalogue are accepted and routed by the gateway.
    pub fn select_model(&mut self, model: impl Into<String>) -> Option<&'static str> {
        let model = model.into();
        if !catalog::is_known(&model) {
            warn!("Model '{}' is not in the known catalogue", model);
        }
        self.model = model;
        catalog::model_notice(&self.model)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// System prompt, then the most recent exchange, then the new turn
    pub fn build_request(&self, input: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(4);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        if let Some(last) = self.history.latest() {
            messages.push(ChatMessage::user(last.query.clone()));
            messages.push(ChatMessage::assistant(last.response.clone()));
        }
        messages.push(ChatMessage::user(input));

        ChatRequest {
            messages,
            model: self.model.clone(),
        }
    }

    /// Send one user turn. Blank input is ignored and returns `None`.
    /// Only successful exchanges are recorded in history.
    pub async fn send(&mut self, input: &str) -> Option<Outcome> {
        if input.trim().is_empty() {
            return None;
        }

        let request = self.build_request(input);
        self.transcript.push(TranscriptEntry::user(input));
        debug!(
            "Sending turn with {} context messages to model '{}'",
            request.messages.len(),
            self.model
        );

        let outcome = self.controller.send(&request).await;
        self.transcript.push(TranscriptEntry::bot(outcome.text()));
        if outcome.is_success() {
            self.history.push(input, outcome.text());
        }
        Some(outcome)
    }

    /// Show a stored exchange as the whole transcript. No request is made.
    pub fn replay(&mut self, index: usize) -> Option<&HistoryEntry> {
        let entry = self.history.get(index)?;
        self.transcript = vec![
            TranscriptEntry::user(entry.query.clone()),
            TranscriptEntry::bot(entry.response.clone()),
        ];
        Some(entry)
    }

    /// Forget the transcript and all stored history
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::fallback::DOUBLE_FAILURE_MESSAGE;
    use crate::history::MemoryStorage;
    use crate::transport::ChatTransport;
    use async_trait::async_trait;
    use polyems_core::ChatRole;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Echoes the last user message, or fails every call
    struct EchoTransport {
        fail: bool,
        calls: AtomicUsize,
        last: Mutex<Option<ChatRequest>>,
    }

    impl EchoTransport {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatTransport for EchoTransport {
        async fn post_chat(&self, _route: &str, payload: &ChatRequest) -> Result<String, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(payload.clone());
            if self.fail {
                return Err(ClientError::Decode("down".to_string()));
            }
            let last = payload.messages.last().map(|m| m.content.clone());
            Ok(format!("echo: {}", last.unwrap_or_default()))
        }
    }

    fn session(transport: Arc<EchoTransport>) -> ChatSession {
        let controller = FallbackController::new(transport, "/api/chat", "/api/chat/v2");
        let history = HistoryManager::load(Box::new(MemoryStorage::new()), 10);
        ChatSession::new(controller, history).with_system_prompt("be brief")
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let transport = EchoTransport::new(false);
        let mut chat = session(transport.clone());

        assert!(chat.send("   \n").await.is_none());
        assert!(chat.transcript().is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_request_carries_only_latest_exchange() {
        let transport = EchoTransport::new(false);
        let mut chat = session(transport.clone());

        chat.send("first").await.unwrap();
        chat.send("second").await.unwrap();
        chat.send("third").await.unwrap();

        let sent = transport.last.lock().unwrap().clone().unwrap();
        let roles: Vec<ChatRole> = sent.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(sent.messages[0].content, "be brief");
        assert_eq!(sent.messages[1].content, "second");
        assert_eq!(sent.messages[2].content, "echo: second");
        assert_eq!(sent.messages[3].content, "third");
        assert_eq!(sent.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_first_turn_has_no_history_context() {
        let chat = session(EchoTransport::new(false));
        let request = chat.build_request("hello");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn test_double_failure_is_shown_but_not_recorded() {
        let transport = EchoTransport::new(true);
        let mut chat = session(transport.clone());

        let outcome = chat.send("hi").await.unwrap();
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(transport.calls(), 2);
        assert_eq!(chat.transcript().len(), 2);
        assert_eq!(chat.transcript()[1].text, DOUBLE_FAILURE_MESSAGE);
        assert!(chat.history().is_empty());
    }

    #[tokio::test]
    async fn test_replay_makes_no_network_call() {
        let transport = EchoTransport::new(false);
        let mut chat = session(transport.clone());
        chat.send("one").await.unwrap();
        chat.send("two").await.unwrap();
        let before = transport.calls();

        let entry = chat.replay(0).cloned().unwrap();
        assert_eq!(transport.calls(), before);
        assert_eq!(
            chat.transcript(),
            &[
                TranscriptEntry::user("one"),
                TranscriptEntry::bot("echo: one"),
            ]
        );
        assert_eq!(entry.query, "one");
        assert!(chat.replay(5).is_none());
    }

    #[tokio::test]
    async fn test_clear_resets_transcript_and_history() {
        let mut chat = session(EchoTransport::new(false));
        chat.send("one").await.unwrap();
        chat.clear();
        assert!(chat.transcript().is_empty());
        assert!(chat.history().is_empty());
        assert_eq!(chat.build_request("x").messages.len(), 2);
    }

    #[test]
    fn test_select_model_reports_notice() {
        let mut chat = session(EchoTransport::new(false));
        assert!(chat.select_model("gemini-1.5-pro").is_some());
        assert_eq!(chat.model(), "gemini-1.5-pro");
        assert!(chat.select_model("gpt-4o").is_none());
        assert!(chat.select_model("custom-model").is_none());
        assert_eq!(chat.model(), "custom-model");
    }
}
