use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::events::RepositoryEvent;
use crate::models::{
    Author, DEFAULT_SESSION_TITLE, Message, Session, SessionFilter, SessionSort,
};
use crate::storage::{Store, StoreLocation, StoreResult};

const EVENT_CAPACITY: usize = 64;

/// The only write path for sessions and messages.
///
/// Operations never fail from the caller's point of view: a failed commit is
/// logged and published as [`RepositoryEvent::CommitFailed`], and a failed
/// query yields an empty result.
pub struct ChatRepository {
    store: Store,
    events: broadcast::Sender<RepositoryEvent>,
}

impl ChatRepository {
    pub fn new(store: Store) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, events }
    }

    pub async fn open(location: StoreLocation) -> StoreResult<Self> {
        Ok(Self::new(Store::open(location).await?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Receive an event for every mutation made from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: RepositoryEvent) {
        // No subscribers is fine
        self.events.send(event).ok();
    }

    async fn commit(&self, operation: &'static str) -> bool {
        match self.store.commit().await {
            Ok(_) => true,
            Err(e) => {
                error!(operation, error = %e, "Failed to commit changes");
                self.publish(RepositoryEvent::CommitFailed {
                    operation,
                    message: e.to_string(),
                });
                false
            }
        }
    }

    pub async fn create_session(&self, title: &str) -> Session {
        let session = Session::new(title);
        self.store.insert_session(&session);
        if self.commit("create_session").await {
            info!(session_id = %session.id(), "Created session");
        }
        self.publish(RepositoryEvent::SessionsChanged);
        session
    }

    /// Hand back the most recent unarchived session without messages, or
    /// create one when there is none.
    pub async fn create_or_reuse_empty_session(&self, title: &str) -> Session {
        let reusable = self
            .fetch_all(None)
            .await
            .into_iter()
            .find(|s| s.is_empty() && !s.is_archived());

        match reusable {
            Some(session) => {
                debug!(session_id = %session.id(), "Reusing empty session");
                session
            }
            None => self.create_session(title).await,
        }
    }

    pub async fn delete_session(&self, session: &Session) {
        self.store.delete_session(session.id());
        if self.commit("delete_session").await {
            info!(session_id = %session.id(), "Deleted session");
        }
        self.publish(RepositoryEvent::SessionsChanged);
    }

    /// Bump `last_modified_at` and persist the session's current fields
    pub async fn update_session(&self, session: &mut Session) {
        session.touch();
        self.store.update_session(session);
        self.commit("update_session").await;
        self.publish(RepositoryEvent::SessionsChanged);
    }

    pub async fn set_archived(&self, session: &mut Session, archived: bool) {
        session.set_archived(archived);
        self.update_session(session).await;
    }

    pub async fn rename_session(&self, session: &mut Session, title: &str) {
        session.set_title(title);
        self.update_session(session).await;
    }

    /// Append a message to the session and persist it.
    ///
    /// The session's `last_modified_at` is left alone; call
    /// [`ChatRepository::update_session`] afterwards to record the activity.
    pub async fn add_message(
        &self,
        content: &str,
        author: Author,
        session: &mut Session,
    ) -> Message {
        let message = Message::new(content, author, session.id());
        let position = session.message_count() as i64;

        self.store.insert_message(&message, position);
        session.push_message(message.clone());
        self.commit("add_message").await;

        self.publish(RepositoryEvent::MessageAdded {
            session_id: session.id(),
        });
        message
    }

    /// All sessions, most recently modified first unless `sort` says otherwise
    pub async fn fetch_all(&self, sort: Option<SessionSort>) -> Vec<Session> {
        self.fetch_filtered(SessionFilter::All, sort.unwrap_or_default())
            .await
    }

    pub async fn fetch_filtered(&self, filter: SessionFilter, sort: SessionSort) -> Vec<Session> {
        match self.store.query_sessions(filter, sort).await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, ?filter, "Error fetching chat sessions");
                Vec::new()
            }
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<Session> {
        match self
            .store
            .query_sessions(SessionFilter::Id(id), SessionSort::default())
            .await
        {
            Ok(sessions) => sessions.into_iter().next(),
            Err(e) => {
                error!(session_id = %id, error = %e, "Error finding chat session");
                None
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Wipe the store and start over with a single default session.
    ///
    /// The default session is committed as part of the reset, so observers
    /// never see an empty session list.
    pub async fn reset_database(&self) -> Session {
        let session = Session::new(DEFAULT_SESSION_TITLE);
        match self.store.reset_with(std::slice::from_ref(&session)).await {
            Ok(_) => info!(session_id = %session.id(), "Database reset"),
            Err(e) => {
                error!(error = %e, "Failed to seed database after reset");
                self.publish(RepositoryEvent::CommitFailed {
                    operation: "reset_database",
                    message: e.to_string(),
                });
            }
        }
        self.publish(RepositoryEvent::DatabaseReset);
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn repository() -> ChatRepository {
        ChatRepository::open(StoreLocation::InMemory).await.unwrap()
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_create_session_defaults() {
        let repo = repository().await;
        let session = repo.create_session("Fresh").await;

        assert_eq!(session.title(), "Fresh");
        assert!(session.is_empty());
        assert!(!session.is_archived());
        assert_eq!(session.created_at(), session.last_modified_at());
        assert_eq!(repo.find_by_id(session.id()).await, Some(session));
    }

    #[tokio::test]
    async fn test_fetch_all_reflects_surviving_sessions_newest_first() {
        let repo = repository().await;
        let mut first = repo.create_session("first").await;
        tick().await;
        let second = repo.create_session("second").await;
        tick().await;
        let third = repo.create_session("third").await;
        tick().await;

        repo.delete_session(&second).await;
        repo.update_session(&mut first).await;

        let ids: Vec<Uuid> = repo.fetch_all(None).await.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![first.id(), third.id()]);
    }

    #[tokio::test]
    async fn test_fetch_all_with_explicit_sort() {
        let repo = repository().await;
        let older = repo.create_session("older").await;
        tick().await;
        let newer = repo.create_session("newer").await;

        let ids: Vec<Uuid> = repo
            .fetch_all(Some(SessionSort::CreatedAsc))
            .await
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, vec![older.id(), newer.id()]);
    }

    #[tokio::test]
    async fn test_delete_session_removes_messages() {
        let repo = repository().await;
        let mut session = repo.create_session("S").await;
        repo.add_message("one", Author::User, &mut session).await;
        repo.add_message("two", Author::Assistant, &mut session).await;

        repo.delete_session(&session).await;

        assert!(repo.find_by_id(session.id()).await.is_none());
        assert!(repo.store().query_messages(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_message_timestamp_not_before_session_creation() {
        let repo = repository().await;
        let mut session = repo.create_session("S").await;
        let message = repo.add_message("hello", Author::User, &mut session).await;

        assert!(message.timestamp() >= session.created_at());
        assert_eq!(message.session_id(), session.id());
    }

    #[tokio::test]
    async fn test_add_message_does_not_bump_last_modified() {
        let repo = repository().await;
        let mut session = repo.create_session("S").await;
        let before = session.last_modified_at();
        tick().await;

        repo.add_message("hello", Author::User, &mut session).await;

        assert_eq!(session.last_modified_at(), before);
        let stored = repo.find_by_id(session.id()).await.unwrap();
        assert_eq!(stored.last_modified_at(), before);
    }

    #[tokio::test]
    async fn test_update_session_bumps_last_modified() {
        let repo = repository().await;
        let mut session = repo.create_session("S").await;
        let before = session.last_modified_at();
        tick().await;

        repo.update_session(&mut session).await;

        assert!(session.last_modified_at() > before);
        let stored = repo.find_by_id(session.id()).await.unwrap();
        assert_eq!(stored.last_modified_at(), session.last_modified_at());
    }

    #[tokio::test]
    async fn test_conversation_scenario_orders_messages() {
        let repo = repository().await;
        let mut session = repo.create_session("S1").await;
        repo.add_message("Hi", Author::User, &mut session).await;
        repo.add_message("Hello", Author::Assistant, &mut session).await;

        let found = repo.find_by_id(session.id()).await.unwrap();
        let contents: Vec<&str> = found.sorted_messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["Hi", "Hello"]);
        assert!(found.sorted_messages()[0].is_user());
        assert!(!found.sorted_messages()[1].is_user());
    }

    #[tokio::test]
    async fn test_reset_database_leaves_one_default_session() {
        let repo = repository().await;
        for i in 0..3 {
            let mut session = repo.create_session(&format!("S{}", i)).await;
            repo.add_message("msg", Author::User, &mut session).await;
        }

        let fresh = repo.reset_database().await;

        let sessions = repo.fetch_all(None).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id(), fresh.id());
        assert_eq!(sessions[0].title(), DEFAULT_SESSION_TITLE);
        assert!(sessions[0].is_empty());
        assert!(repo.store().query_messages(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_archive_toggle_persists() {
        let repo = repository().await;
        let mut session = repo.create_session("S").await;

        repo.set_archived(&mut session, true).await;
        assert!(repo.find_by_id(session.id()).await.unwrap().is_archived());

        repo.set_archived(&mut session, false).await;
        assert!(!repo.find_by_id(session.id()).await.unwrap().is_archived());
    }

    #[tokio::test]
    async fn test_rename_session() {
        let repo = repository().await;
        let mut session = repo.create_session("Old").await;
        repo.rename_session(&mut session, "New").await;
        assert_eq!(repo.find_by_id(session.id()).await.unwrap().title(), "New");
    }

    #[tokio::test]
    async fn test_reuses_existing_empty_session() {
        let repo = repository().await;
        let empty = repo.create_session("Empty").await;

        let reused = repo.create_or_reuse_empty_session("New Chat").await;

        assert_eq!(reused.id(), empty.id());
        assert_eq!(repo.fetch_all(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_does_not_reuse_session_with_messages() {
        let repo = repository().await;
        let mut busy = repo.create_session("Busy").await;
        repo.add_message("hi", Author::User, &mut busy).await;

        let created = repo.create_or_reuse_empty_session("New Chat").await;

        assert_ne!(created.id(), busy.id());
        assert_eq!(repo.fetch_all(None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_unknown_id() {
        let repo = repository().await;
        assert!(repo.find_by_id(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let repo = repository().await;
        let mut events = repo.subscribe();

        let mut session = repo.create_session("S").await;
        repo.add_message("hi", Author::User, &mut session).await;
        repo.delete_session(&session).await;

        assert_eq!(events.recv().await.unwrap(), RepositoryEvent::SessionsChanged);
        assert_eq!(
            events.recv().await.unwrap(),
            RepositoryEvent::MessageAdded {
                session_id: session.id()
            }
        );
        assert_eq!(events.recv().await.unwrap(), RepositoryEvent::SessionsChanged);
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported_not_raised() {
        let repo = repository().await;
        let mut session = repo.create_session("S").await;
        repo.delete_session(&session).await;
        let mut events = repo.subscribe();

        // The session row is gone, so the foreign key rejects the message
        let message = repo.add_message("lost", Author::User, &mut session).await;

        assert_eq!(message.content(), "lost");
        assert_eq!(session.message_count(), 1);
        match events.recv().await.unwrap() {
            RepositoryEvent::CommitFailed { operation, .. } => assert_eq!(operation, "add_message"),
            other => panic!("expected CommitFailed, got {:?}", other),
        }
        assert!(repo.store().query_messages(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_publishes_single_event_after_seeding() {
        let repo = repository().await;
        repo.create_session("old").await;
        let mut events = repo.subscribe();

        let fresh = repo.reset_database().await;

        assert_eq!(events.recv().await.unwrap(), RepositoryEvent::DatabaseReset);
        assert!(events.try_recv().is_err());
        assert_eq!(repo.fetch_all(None).await, vec![fresh]);
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = repository().await;
        assert!(repo.health_check().await);
    }
}
