use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::utils::time::now_millis;

/// Who authored a message in the conversation log.
///
/// Serialized with the API's wire names so persisted logs and API turns agree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The person typing.
    #[serde(rename = "user")]
    User,

    /// The model.
    #[serde(rename = "model")]
    Assistant,
}

/// A single entry in the conversation log.
///
/// At most one message in a log is `in_progress`.  While in progress its text only grows; once
/// finalized it never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, stable across every intermediate streaming state.
    pub id: String,

    /// The author of the message.
    pub role: Role,

    /// The message text.
    pub text: String,

    /// True while the reply is still streaming.
    #[serde(default, rename = "isStreaming")]
    pub in_progress: bool,

    /// Creation time, persisted as Unix milliseconds.
    #[serde(rename = "timestamp", with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Create a finalized message with a fresh id.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            in_progress: false,
            created_at: now_millis(),
        }
    }

    /// Create a finalized user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an empty, in-progress assistant message.
    pub fn placeholder() -> Self {
        Self {
            in_progress: true,
            ..Self::new(Role::Assistant, "")
        }
    }

    /// Create a finalized assistant message carrying a user-visible notice.
    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// True for finalized messages with non-blank text.
    pub fn is_settled(&self) -> bool {
        !self.in_progress && !self.text.trim().is_empty()
    }
}
