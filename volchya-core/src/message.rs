//! Conversation history entries.

use crate::dispatch::FailureKind;
use crate::narrative::{self, NarrativeSegment};
use serde::Serialize;

/// Who a history entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Locally synthesized notices. Never sent to the model.
    System,
}

/// One entry in the session's message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Local wall-clock time the entry was appended, `HH:MM:SS`.
    pub timestamp: String,
    /// For system notices, the failure that produced them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), None)
    }

    /// A system notice describing a failed dispatch.
    pub fn failure_notice(kind: FailureKind) -> Self {
        Self::new(Role::System, kind.notice().to_string(), Some(kind))
    }

    fn new(role: Role, content: String, failure: Option<FailureKind>) -> Self {
        Self {
            role,
            content,
            timestamp: now_timestamp(),
            failure,
        }
    }

    /// Whether this entry is replayed to the model as conversation history.
    pub fn is_replayable(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
    }

    /// Parsed narrative segments. Empty for anything but assistant replies.
    pub fn segments(&self) -> Vec<NarrativeSegment> {
        match self.role {
            Role::Assistant => narrative::parse(&self.content),
            _ => Vec::new(),
        }
    }
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
