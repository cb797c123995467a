use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::Session;
use crate::repositories::{ChatRepository, RepositoryEvent};

/// Observable mirror of the session list for display.
///
/// Not authoritative: every refresh is a full re-query through the
/// repository, replacing the previous list wholesale.
pub struct SessionCache {
    repository: Arc<ChatRepository>,
    sessions: watch::Sender<Arc<Vec<Session>>>,
}

impl SessionCache {
    pub fn new(repository: Arc<ChatRepository>) -> Self {
        let (sessions, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            repository,
            sessions,
        }
    }

    /// Replace the held list with a fresh `fetch_all`
    pub async fn refresh(&self) {
        let sessions = self.repository.fetch_all(None).await;
        debug!(count = sessions.len(), "Refreshed session cache");
        self.sessions.send_replace(Arc::new(sessions));
    }

    /// Snapshot of the last fetched list
    pub fn sessions(&self) -> Arc<Vec<Session>> {
        self.sessions.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.sessions.borrow().len()
    }

    /// Watch the list; the receiver is notified after every refresh
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Session>>> {
        self.sessions.subscribe()
    }

    /// Keep the cache in sync with the repository.
    ///
    /// Subscribes before the initial load so no mutation can slip between the
    /// two, then refreshes after every repository event. Abort the returned
    /// handle to stop syncing.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut events = cache.repository.subscribe();

        tokio::spawn(async move {
            cache.refresh().await;

            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let RepositoryEvent::CommitFailed { operation, message } = &event {
                            warn!(operation, error = %message, "Re-reading sessions after failed commit");
                        }
                        cache.refresh().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Session cache lagged behind repository events");
                        cache.refresh().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
