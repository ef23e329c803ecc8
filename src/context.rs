//! Conversational slot context carried with every outbound message.

use serde::{Deserialize, Serialize};

use crate::protocol::ExtractedInfo;

/// Slot values gathered so far in the conversation.
///
/// Fields only ever change to a non-empty value: merging an extraction whose
/// values are empty or absent leaves the context as it was.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    #[serde(default)]
    pub vaccine_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub special_requirements: String,
}

impl ConversationContext {
    /// Merge extracted values, latest non-empty value wins.
    ///
    /// Returns `true` if any field changed.
    pub fn merge(&mut self, info: &ExtractedInfo) -> bool {
        let mut changed = false;
        changed |= overwrite(&mut self.vaccine_type, info.vaccine_type.as_deref());
        changed |= overwrite(&mut self.location, info.location.as_deref());
        changed |= overwrite(&mut self.date, info.datetime.as_deref());
        changed |= overwrite(
            &mut self.special_requirements,
            info.special_requirements.as_deref(),
        );
        changed
    }

    /// Whether no slot has been filled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn overwrite(field: &mut String, incoming: Option<&str>) -> bool {
    match incoming.map(str::trim) {
        Some(value) if !value.is_empty() && value != field => {
            *field = value.to_string();
            true
        }
        _ => false,
    }
}
