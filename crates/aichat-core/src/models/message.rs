use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a message. Only two origins are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn is_user(&self) -> bool {
        matches!(self, Author::User)
    }

    pub fn from_is_user(is_user: bool) -> Self {
        if is_user {
            Author::User
        } else {
            Author::Assistant
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Author::User => "you",
            Author::Assistant => "assistant",
        }
    }
}

/// A single turn in a conversation.
///
/// `session_id` is a lookup key only; the owning [`Session`](super::Session)
/// controls the message lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    content: String,
    author: Author,
    timestamp: DateTime<Utc>,
    session_id: Uuid,
}

impl Message {
    pub fn new(content: impl Into<String>, author: Author, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            author,
            timestamp: super::now(),
            session_id,
        }
    }

    /// Rebuild a message from persisted columns
    pub(crate) fn from_parts(
        id: Uuid,
        content: String,
        author: Author,
        timestamp: DateTime<Utc>,
        session_id: Uuid,
    ) -> Self {
        Self {
            id,
            content,
            author,
            timestamp,
            session_id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn is_user(&self) -> bool {
        self.author.is_user()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}
