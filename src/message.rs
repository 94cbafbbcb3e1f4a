use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::SessionStatus;

/// One button the chat surface renders alongside a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Element {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Element {
    pub fn button(label: impl Into<String>) -> Self {
        let label = label.into();
        Element {
            value: Some(label.clone()),
            label: Some(label),
        }
    }
}

/// One outbound chat message emitted while stepping through nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Element>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage {
            text: Some(text.into()),
            elements: Vec::new(),
        }
    }

    pub fn buttons(elements: Vec<Element>) -> Self {
        OutboundMessage {
            text: None,
            elements,
        }
    }
}

/// What the chat user sent back while the session was suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum ResumeInput {
    /// Free-form text typed at a listener node.
    Utterance(String),
    /// A branch label picked at a decider node.
    Decision(String),
}

impl ResumeInput {
    pub fn text(&self) -> &str {
        match self {
            ResumeInput::Utterance(s) | ResumeInput::Decision(s) => s,
        }
    }
}

/// The transport-facing result of one turn: everything the flow emitted plus
/// the status the session landed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionEvent {
    pub session_id: String,
    pub messages: Vec<OutboundMessage>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_element_mirrors_label() {
        let e = Element::button("yes");
        assert_eq!(e.label.as_deref(), Some("yes"));
        assert_eq!(e.value.as_deref(), Some("yes"));
    }

    #[test]
    fn test_outbound_message_serialization_skips_empty() {
        let msg = OutboundMessage::text("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hi"}));
    }

    #[test]
    fn test_resume_input_text() {
        assert_eq!(ResumeInput::Utterance("hi".into()).text(), "hi");
        assert_eq!(ResumeInput::Decision("yes".into()).text(), "yes");
    }
}
