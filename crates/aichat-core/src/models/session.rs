use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{Author, Message};
use super::now;

/// Title given to sessions created by "new chat" and after a reset
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Title used when the first user message yields nothing to show
const FALLBACK_TITLE: &str = "Chat";

/// Number of characters of the first user message used as the session title
const TITLE_PREFIX_LEN: usize = 20;

/// A titled conversation that exclusively owns its messages.
///
/// Messages are kept in insertion order, which is not guaranteed to match
/// chronological order; use [`Session::sorted_messages`] for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    last_modified_at: DateTime<Utc>,
    is_archived: bool,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(title: impl Into<String>) -> Self {
        let created_at = now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at,
            last_modified_at: created_at,
            is_archived: false,
            messages: Vec::new(),
        }
    }

    /// Rebuild a session from persisted columns
    pub(crate) fn from_parts(
        id: Uuid,
        title: String,
        created_at: DateTime<Utc>,
        last_modified_at: DateTime<Utc>,
        is_archived: bool,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            id,
            title,
            created_at,
            last_modified_at: last_modified_at.max(created_at),
            is_archived,
            messages,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified_at(&self) -> DateTime<Utc> {
        self.last_modified_at
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    pub fn set_archived(&mut self, archived: bool) {
        self.is_archived = archived;
    }

    /// Messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages ordered by timestamp; equal timestamps keep insertion order
    pub fn sorted_messages(&self) -> Vec<&Message> {
        let mut sorted: Vec<&Message> = self.messages.iter().collect();
        sorted.sort_by_key(|m| m.timestamp());
        sorted
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Bump `last_modified_at`, never letting it fall behind `created_at`
    pub fn touch(&mut self) {
        self.last_modified_at = now().max(self.created_at).max(self.last_modified_at);
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Title derived from the first user message, if there is one
    pub fn derived_title(&self) -> String {
        let first = self
            .messages
            .iter()
            .find(|m| m.author() == Author::User)
            .map(|m| m.content())
            .unwrap_or_default();
        title_from_message(first)
    }
}

/// Shorten a message into a sidebar title: the first 20 characters, with an
/// ellipsis once the prefix reaches that length.
///
/// Characters are Unicode scalar values, not grapheme clusters, so a
/// combining sequence or a multi-codepoint emoji counts as several.
pub fn title_from_message(content: &str) -> String {
    let truncated: String = content.chars().take(TITLE_PREFIX_LEN).collect();
    if truncated.is_empty() {
        FALLBACK_TITLE.to_string()
    } else if truncated.chars().count() >= TITLE_PREFIX_LEN {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Sort orders for session listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionSort {
    #[default]
    LastModifiedDesc,
    LastModifiedAsc,
    CreatedDesc,
    CreatedAsc,
    TitleAsc,
}

impl SessionSort {
    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            SessionSort::LastModifiedDesc => "last_modified_at DESC, created_at DESC",
            SessionSort::LastModifiedAsc => "last_modified_at ASC, created_at ASC",
            SessionSort::CreatedDesc => "created_at DESC",
            SessionSort::CreatedAsc => "created_at ASC",
            SessionSort::TitleAsc => "title COLLATE NOCASE ASC, created_at ASC",
        }
    }
}

/// Row filters for session queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionFilter {
    #[default]
    All,
    Id(Uuid),
    Archived(bool),
}
