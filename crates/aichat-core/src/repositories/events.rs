use uuid::Uuid;

/// Notifications published by [`ChatRepository`](super::ChatRepository)
/// after every mutation, so observers never rely on remembering to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    /// A session was created, updated, archived or deleted
    SessionsChanged,
    MessageAdded { session_id: Uuid },
    /// The store was wiped and now holds only a fresh default session
    DatabaseReset,
    /// A commit failed. The caller saw success, so the in-memory entity may
    /// now disagree with storage until the next re-query.
    CommitFailed {
        operation: &'static str,
        message: String,
    },
}
