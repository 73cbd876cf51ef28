use serde::{Deserialize, Serialize};

use crate::types::{Message, Role};

/// One piece of a turn's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// The text of this part.
    #[serde(default)]
    pub text: String,

    /// Set when the part is model reasoning rather than reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    /// Create a plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thought: None,
        }
    }

    /// True if this part is reasoning output.
    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

/// A conversation turn in the API's format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The author of the turn.  Streamed chunks occasionally omit it; those are model output.
    #[serde(default = "model_role")]
    pub role: Role,

    /// The turn's content.
    #[serde(default)]
    pub parts: Vec<Part>,
}

fn model_role() -> Role {
    Role::Assistant
}

impl Turn {
    /// Create a single-part turn.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Concatenated reply text, skipping reasoning parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| !part.is_thought())
            .map(|part| part.text.as_str())
            .collect()
    }
}

/// Translate a message log into seed history.
///
/// Messages that are still streaming or have blank text are left out.
pub fn seed_history(messages: &[Message]) -> Vec<Turn> {
    messages
        .iter()
        .filter(|msg| msg.is_settled())
        .map(|msg| Turn::new(msg.role, msg.text.clone()))
        .collect()
}
