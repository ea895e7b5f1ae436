//! Message model and the in-memory session view.
//!
//! A [`Session`] is the live, ordered message list for an active conversation
//! turn. Messages accumulate append-only until compaction replaces a prefix
//! with a single summary message. The durable counterpart of the session view
//! is the [`EntryLog`](log::EntryLog).

mod log;

pub use log::EntryLog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    /// A generated summary standing in for a compacted transcript prefix.
    Summary,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique entry id.
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Build the summary message that replaces a compacted prefix.
    pub fn summary(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Summary, content)
    }

    pub fn is_summary(&self) -> bool {
        self.role == MessageRole::Summary
    }
}

/// Live message view for an active conversation.
///
/// The session view is rebuilt from the durable log immediately before and
/// after summarization; between reconciliations it is the working copy the
/// orchestrator summarizes and re-estimates.
#[derive(Debug, Default, Clone)]
pub struct Session {
    messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the entire view, e.g. after reloading from the durable log.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
