//! The chat view: a state container mutated only by named event handlers.
//!
//! A [`ChatView`] owns everything one mounted widget knows: the transcript,
//! the pending input, the slot context, the typing flag and the connection
//! status. Rendering is a pure projection of this state (see
//! [`crate::render`]).
//!
//! # Example
//!
//! ```rust
//! use appointment_chat::identity::ClientIdentity;
//! use appointment_chat::view::ChatView;
//!
//! let mut view = ChatView::new(ClientIdentity::generate());
//! view.set_input("I need a flu shot");
//! let outbound = view.submit().unwrap();
//!
//! assert_eq!(outbound.message, "I need a flu shot");
//! assert_eq!(view.messages().len(), 1);
//! assert!(view.input().is_empty());
//! ```

use tracing::{debug, warn};

use crate::context::ConversationContext;
use crate::identity::ClientIdentity;
use crate::protocol::{ChatMessage, OutboundMessage, parse_inbound};

/// State of the duplex channel as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Mounted, first connection attempt in progress.
    Connecting,
    /// Channel open.
    Open,
    /// Channel dropped; a retry is scheduled.
    Reconnecting {
        /// 1-based retry number.
        attempt: u32,
    },
    /// Channel dropped and no further retries will be made.
    Disconnected,
}

/// Local state of one chat widget.
#[derive(Debug, Clone)]
pub struct ChatView {
    client_id: ClientIdentity,
    messages: Vec<ChatMessage>,
    input: String,
    context: ConversationContext,
    typing: bool,
    status: ConnectionStatus,
    followup_pending: bool,
    delivery_failed: bool,
}

impl ChatView {
    /// Create an empty view for the given client.
    #[must_use]
    pub fn new(client_id: ClientIdentity) -> Self {
        Self {
            client_id,
            messages: Vec::new(),
            input: String::new(),
            context: ConversationContext::default(),
            typing: false,
            status: ConnectionStatus::Connecting,
            followup_pending: false,
            delivery_failed: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Channel events
    // ─────────────────────────────────────────────────────────────────────

    /// The channel opened (or reopened).
    pub fn on_open(&mut self) {
        self.status = ConnectionStatus::Open;
    }

    /// Handle one raw inbound frame.
    ///
    /// Malformed frames are dropped with a diagnostic. Returns whether the
    /// frame was accepted.
    pub fn on_frame(&mut self, frame: &str) -> bool {
        match parse_inbound(frame) {
            Ok(message) => {
                self.on_message(message);
                true
            }
            Err(e) => {
                warn!(
                    name: "chat.inbound.malformed",
                    client_id = %self.client_id,
                    error = %e,
                    frame_length = frame.len(),
                    "Dropping malformed inbound message"
                );
                false
            }
        }
    }

    /// Apply one parsed inbound message.
    pub fn on_message(&mut self, message: ChatMessage) {
        if message.is_typing() {
            self.typing = true;
            return;
        }
        self.typing = false;
        self.delivery_failed = false;

        if let ChatMessage::AiResponse(resp) = &message {
            if let Some(info) = &resp.extracted_info
                && self.context.merge(info)
            {
                debug!(
                    client_id = %self.client_id,
                    context = ?self.context,
                    "Conversation context updated"
                );
            }
            self.followup_pending = resp.needs_followup();
        }

        self.messages.push(message);
    }

    /// The channel closed or failed.
    ///
    /// `retry` is the upcoming retry number, or `None` when no retry will
    /// follow.
    pub fn on_disconnected(&mut self, retry: Option<u32>) {
        self.typing = false;
        self.status = match retry {
            Some(attempt) => ConnectionStatus::Reconnecting { attempt },
            None => ConnectionStatus::Disconnected,
        };
    }

    // ─────────────────────────────────────────────────────────────────────
    // User input
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the pending input text.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Send the pending input.
    ///
    /// Empty and whitespace-only input is rejected. Otherwise the patient
    /// message is echoed into the transcript, the input is cleared and the
    /// payload to transmit is returned.
    pub fn submit(&mut self) -> Option<OutboundMessage> {
        if self.input.trim().is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.input);
        self.messages.push(ChatMessage::patient(text.clone()));
        self.followup_pending = false;
        self.delivery_failed = false;

        Some(OutboundMessage {
            message: text,
            context: self.context.clone(),
        })
    }

    /// Transmission of the last submitted message failed.
    ///
    /// The local echo stays in the transcript.
    pub fn on_send_failed(&mut self) {
        self.delivery_failed = true;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn client_id(&self) -> &ClientIdentity {
        &self.client_id
    }

    /// Transcript, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Whether the assistant is composing.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether the assistant is waiting for missing information.
    #[must_use]
    pub fn followup_pending(&self) -> bool {
        self.followup_pending
    }

    /// Whether the last send could not be delivered.
    #[must_use]
    pub fn delivery_failed(&self) -> bool {
        self.delivery_failed
    }

    /// Render the transcript as an HTML fragment.
    #[must_use]
    pub fn render(&self) -> String {
        crate::render::transcript(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view() -> ChatView {
        ChatView::new(ClientIdentity::generate())
    }

    #[test]
    fn test_transcript_follows_delivery_order_without_typing() {
        let mut view = view();
        assert!(view.on_frame(r#"{"type":"system","message":"Welcome"}"#));
        assert!(view.on_frame(r#"{"type":"ai_typing"}"#));
        assert!(view.on_frame(r#"{"type":"ai_response","message":"first"}"#));
        assert!(view.on_frame(r#"{"type":"ai_typing"}"#));
        assert!(view.on_frame(r#"{"type":"ai_response","message":"second"}"#));

        let texts: Vec<&str> = view.messages().iter().map(ChatMessage::text).collect();
        assert_eq!(texts, vec!["Welcome", "first", "second"]);
        assert!(view.messages().iter().all(|m| !m.is_typing()));
    }

    #[test]
    fn test_typing_toggle() {
        let mut view = view();
        assert!(!view.is_typing());

        view.on_frame(r#"{"type":"ai_typing"}"#);
        assert!(view.is_typing());
        view.on_frame(r#"{"type":"ai_typing"}"#);
        assert!(view.is_typing());

        view.on_frame(r#"{"type":"ai_response","message":"done"}"#);
        assert!(!view.is_typing());
    }

    #[test]
    fn test_send_round_trip() {
        let mut view = view();
        view.set_input("I need a flu shot");
        let out = view.submit().unwrap();

        assert_eq!(view.messages(), &[ChatMessage::patient("I need a flu shot")]);
        assert_eq!(out.message, "I need a flu shot");
        assert_eq!(&out.context, view.context());
        assert!(view.input().is_empty());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let mut view = view();
        assert!(view.submit().is_none());
        view.set_input("   \n\t");
        assert!(view.submit().is_none());
        assert!(view.messages().is_empty());
    }

    #[test]
    fn test_failed_send_keeps_echo() {
        let mut view = view();
        view.set_input("hello");
        view.submit().unwrap();
        view.on_send_failed();

        assert_eq!(view.messages().len(), 1);
        assert!(view.delivery_failed());

        view.set_input("again");
        view.submit().unwrap();
        assert_eq!(view.messages().len(), 2);
        assert!(!view.delivery_failed());
    }

    #[test]
    fn test_ai_response_merges_context() {
        let mut view = view();
        view.on_frame(
            &json!({
                "type": "ai_response",
                "message": {"response": "<b>Sure</b>"},
                "extracted_info": {"vaccine_type": "flu"}
            })
            .to_string(),
        );
        assert_eq!(view.context().vaccine_type, "flu");

        view.on_frame(
            &json!({
                "type": "ai_response",
                "message": "Where?",
                "extracted_info": {"vaccine_type": null, "location": "Austin"}
            })
            .to_string(),
        );
        assert_eq!(view.context().vaccine_type, "flu");
        assert_eq!(view.context().location, "Austin");

        view.set_input("tomorrow");
        let out = view.submit().unwrap();
        assert_eq!(out.context.vaccine_type, "flu");
        assert_eq!(out.context.location, "Austin");
    }

    #[test]
    fn test_followup_prompt() {
        let mut view = view();
        view.on_frame(r#"{"type":"ai_response","message":"Which vaccine?","requires_followup":true}"#);
        assert!(view.followup_pending());

        view.set_input("flu");
        view.submit();
        assert!(!view.followup_pending());

        view.on_frame(r#"{"type":"ai_response","message":"Where?","requires_followup":true}"#);
        view.on_frame(r#"{"type":"ai_response","message":"Found it","requires_followup":false}"#);
        assert!(!view.followup_pending());
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut view = view();
        view.on_frame(r#"{"type":"ai_typing"}"#);
        assert!(!view.on_frame("{not json"));
        assert!(view.messages().is_empty());
        assert!(view.is_typing());
    }

    #[test]
    fn test_connection_status() {
        let mut view = view();
        assert_eq!(view.status(), ConnectionStatus::Connecting);
        view.on_open();
        assert_eq!(view.status(), ConnectionStatus::Open);

        view.on_frame(r#"{"type":"ai_typing"}"#);
        view.on_disconnected(Some(1));
        assert_eq!(view.status(), ConnectionStatus::Reconnecting { attempt: 1 });
        assert!(!view.is_typing());

        view.on_disconnected(None);
        assert_eq!(view.status(), ConnectionStatus::Disconnected);
    }
}
