//! Wire types exchanged with the scheduling backend.
//!
//! Inbound frames are JSON objects tagged by `type`; outbound frames carry the
//! raw user text plus a snapshot of the [`ConversationContext`].
//!
//! # Example
//!
//! ```rust
//! use appointment_chat::protocol::{ChatMessage, parse_inbound};
//!
//! let msg = parse_inbound(r#"{"type":"ai_typing"}"#).unwrap();
//! assert!(msg.is_typing());
//! ```

use serde::{Deserialize, Serialize};

use crate::context::ConversationContext;
use crate::error::Result;

/// Payload sent to the backend for every user send action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Raw text typed by the patient.
    pub message: String,
    /// Context snapshot at the time of sending.
    pub context: ConversationContext,
}

impl OutboundMessage {
    /// Serialize to the JSON text frame sent over the channel.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message body: plain text, or an object carrying a `response` string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageBody {
    /// Plain text.
    Text(String),
    /// Structured reply from the assistant chain.
    Structured {
        /// The text to display.
        response: String,
    },
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageBody {
    /// The displayable text of this body.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Structured { response: text } => text,
        }
    }
}

impl From<&str> for MessageBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Slot values the backend claims to have inferred.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedInfo {
    #[serde(default)]
    pub vaccine_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub special_requirements: Option<String>,
}

/// A clinic as returned by the backend search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Names of the vaccines the clinic offers.
    #[serde(default)]
    pub vaccines: Vec<String>,
}

/// An appointment slot at a clinic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub clinic_id: Option<i64>,
    #[serde(default)]
    pub patient_id: Option<i64>,
    /// ISO-8601 timestamp of the slot.
    #[serde(default)]
    pub appointment_time: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One clinic hit: the clinic, its distance and its open appointments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClinicSearchResult {
    pub clinic: Clinic,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
}

/// Assistant reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiResponse {
    #[serde(default)]
    pub message: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_info: Option<ExtractedInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_followup: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_clinics: Option<Vec<ClinicSearchResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl AiResponse {
    /// Clinic results, empty when none were sent.
    #[must_use]
    pub fn clinics(&self) -> &[ClinicSearchResult] {
        self.available_clinics.as_deref().unwrap_or_default()
    }

    /// Whether the backend asked for more information.
    #[must_use]
    pub fn needs_followup(&self) -> bool {
        self.requires_followup.unwrap_or(false)
    }
}

/// A message in the conversation, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    /// Authored by the patient (local echo or history replay).
    Patient {
        #[serde(default)]
        message: MessageBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Assistant reply, possibly with slots and clinic results.
    AiResponse(AiResponse),

    /// The assistant is composing. Never stored in history.
    AiTyping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// Informational text from the backend, e.g. the welcome greeting.
    System {
        #[serde(default)]
        message: MessageBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },

    /// The backend failed to process a message.
    Error {
        #[serde(default)]
        message: MessageBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

impl ChatMessage {
    /// Build a patient-authored message.
    #[must_use]
    pub fn patient(text: impl Into<String>) -> Self {
        Self::Patient {
            message: MessageBody::Text(text.into()),
            timestamp: None,
        }
    }

    /// Whether this is the ephemeral typing signal.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        matches!(self, Self::AiTyping { .. })
    }

    /// Whether the patient authored this message.
    #[must_use]
    pub fn is_patient(&self) -> bool {
        matches!(self, Self::Patient { .. })
    }

    /// Wire name of the message type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Patient { .. } => "patient",
            Self::AiResponse(_) => "ai_response",
            Self::AiTyping { .. } => "ai_typing",
            Self::System { .. } => "system",
            Self::Error { .. } => "error",
        }
    }

    /// Displayable text, empty for the typing signal.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Patient { message, .. }
            | Self::System { message, .. }
            | Self::Error { message, .. } => message.text(),
            Self::AiResponse(resp) => resp.message.text(),
            Self::AiTyping { .. } => "",
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_inbound(frame: &str) -> Result<ChatMessage> {
    Ok(serde_json::from_str(frame)?)
}
