// Chat transcript model (in-memory only, never persisted)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only chat transcript.
///
/// Only the trailing assistant message may change, and only through
/// [`Transcript::upsert_trailing_assistant`]. Pushing a user message ends that
/// window for whatever assistant message precedes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.messages.push(Message::user(content));
        self.messages.len() - 1
    }

    /// Append a complete assistant message (e.g. query results).
    pub fn push_assistant(&mut self, content: impl Into<String>) -> usize {
        self.messages.push(Message::assistant(content));
        self.messages.len() - 1
    }

    /// Replace the content of the trailing assistant message, or append a new one when
    /// the transcript ends with a user message (or is empty). Returns its index.
    pub fn upsert_trailing_assistant(&mut self, content: impl Into<String>) -> usize {
        let content = content.into();
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content = content;
            }
            _ => self.messages.push(Message::assistant(content)),
        }
        self.messages.len() - 1
    }
}
