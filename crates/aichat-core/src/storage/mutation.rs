use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Message, Session};

/// Column values of a session row, without its messages
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub is_archived: bool,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            title: session.title().to_string(),
            created_at: session.created_at(),
            last_modified_at: session.last_modified_at(),
            is_archived: session.is_archived(),
        }
    }
}

/// A write staged on the [`Store`](super::Store) until the next commit
#[derive(Debug, Clone)]
pub enum Mutation {
    InsertSession(SessionSnapshot),
    UpdateSession(SessionSnapshot),
    /// Messages owned by the session are removed by the cascade
    DeleteSession(Uuid),
    /// `position` is the index of the message in its session's collection
    InsertMessage { message: Message, position: i64 },
    DeleteMessage(Uuid),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::InsertSession(_) => "insert_session",
            Mutation::UpdateSession(_) => "update_session",
            Mutation::DeleteSession(_) => "delete_session",
            Mutation::InsertMessage { .. } => "insert_message",
            Mutation::DeleteMessage(_) => "delete_message",
        }
    }
}
