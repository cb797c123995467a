use std::sync::Arc;

use tracing::{debug, info, warn};

use super::openai::{CompletionClient, CompletionError};
use crate::models::{Author, DEFAULT_SESSION_TITLE, Message, Session};
use crate::repositories::ChatRepository;
use crate::settings::Settings;

pub const MISSING_API_KEY_REPLY: &str = "Please set your OpenAI API key in the settings.";
pub const EMPTY_RESPONSE_REPLY: &str = "Received an empty response from the AI.";

/// How the assistant reply of an [`Exchange`] came about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Answered,
    /// The provider answered with no choices
    Empty,
    /// The request failed; holds the error description
    Failed(String),
    /// No request was made because no API key is configured
    MissingApiKey,
}

/// One user message and the assistant message stored in reply
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub user: Message,
    pub reply: Message,
    pub outcome: ReplyOutcome,
}

/// Drives a conversation: stores the user's message, asks the completion
/// provider for an answer and stores whatever comes back.
pub struct ChatController {
    repository: Arc<ChatRepository>,
    client: Arc<dyn CompletionClient>,
    settings: Settings,
}

impl ChatController {
    pub fn new(
        repository: Arc<ChatRepository>,
        client: Arc<dyn CompletionClient>,
        settings: Settings,
    ) -> Self {
        Self {
            repository,
            client,
            settings,
        }
    }

    pub fn repository(&self) -> &Arc<ChatRepository> {
        &self.repository
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Most recently modified session, or a fresh one on first launch
    pub async fn ensure_session(&self) -> Session {
        match self.repository.fetch_all(None).await.into_iter().next() {
            Some(session) => session,
            None => {
                info!("No sessions yet, creating the first one");
                self.repository.create_session(DEFAULT_SESSION_TITLE).await
            }
        }
    }

    pub async fn new_chat(&self) -> Session {
        self.repository
            .create_or_reuse_empty_session(DEFAULT_SESSION_TITLE)
            .await
    }

    /// Send `text` in `session` and store the reply.
    ///
    /// Returns `None` without touching anything when `text` is blank. The
    /// completion request runs on its own task; its result is brought back
    /// here before the repository is written to.
    pub async fn send_message(&mut self, session: &mut Session, text: &str) -> Option<Exchange> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let user = self.repository.add_message(text, Author::User, session).await;
        self.repository.update_session(session).await;

        if session.message_count() <= 1 {
            let title = session.derived_title();
            debug!(session_id = %session.id(), %title, "Titling session from first message");
            self.repository.rename_session(session, &title).await;
        }

        let (content, outcome) = match self.settings.api_key() {
            None => {
                warn!("OpenAI API key is not set");
                (
                    MISSING_API_KEY_REPLY.to_string(),
                    ReplyOutcome::MissingApiKey,
                )
            }
            Some(api_key) => self.request_reply(api_key, text).await,
        };

        let reply = self
            .repository
            .add_message(&content, Author::Assistant, session)
            .await;
        self.repository.update_session(session).await;

        Some(Exchange {
            user,
            reply,
            outcome,
        })
    }

    async fn request_reply(&self, api_key: &str, text: &str) -> (String, ReplyOutcome) {
        let request = self.client.create_request(
            text,
            &self.settings.model,
            self.settings.system_prompt(),
            self.settings.temperature,
            self.settings.max_tokens,
        );

        let pending = tokio::spawn(self.client.send(api_key, request));

        match pending.await {
            Ok(Ok(response)) => match response.first_content() {
                Some(content) => (content.to_string(), ReplyOutcome::Answered),
                None => {
                    warn!(response_id = %response.id, "Completion returned no choices");
                    (EMPTY_RESPONSE_REPLY.to_string(), ReplyOutcome::Empty)
                }
            },
            Ok(Err(e)) => failed(&e),
            Err(join_error) => {
                let description = format!("Request failed: {}", join_error);
                warn!(error = %description, "Completion task did not finish");
                (format!("Error: {}", description), ReplyOutcome::Failed(description))
            }
        }
    }
}

fn failed(error: &CompletionError) -> (String, ReplyOutcome) {
    warn!(error = %error, "Chat completion failed");
    let description = error.to_string();
    (
        format!("Error: {}", description),
        ReplyOutcome::Failed(description),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::openai::{
        BoxFuture, ChatChoice, ChatRequest, ChatResponse, ChoiceMessage, CompletionResult, Role,
    };
    use crate::storage::StoreLocation;
    use parking_lot::Mutex;

    /// Replies with a canned result and records every request it sees
    struct FakeClient {
        reply: fn() -> CompletionResult<ChatResponse>,
        requests: Mutex<Vec<(String, ChatRequest)>>,
    }

    impl FakeClient {
        fn new(reply: fn() -> CompletionResult<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl CompletionClient for FakeClient {
        fn send(
            &self,
            api_key: &str,
            request: ChatRequest,
        ) -> BoxFuture<'static, CompletionResult<ChatResponse>> {
            self.requests.lock().push((api_key.to_string(), request));
            let result = (self.reply)();
            Box::pin(async move { result })
        }
    }

    fn response(contents: &[&str]) -> ChatResponse {
        ChatResponse {
            id: "chatcmpl-test".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "gpt-test".into(),
            choices: contents
                .iter()
                .enumerate()
                .map(|(i, c)| ChatChoice {
                    message: ChoiceMessage {
                        role: Role::Assistant,
                        content: Some(c.to_string()),
                    },
                    index: i as u32,
                    finish_reason: Some("stop".into()),
                })
                .collect(),
        }
    }

    fn settings_with_key() -> Settings {
        Settings {
            openai_api_key: Some("sk-test".into()),
            ..Settings::default()
        }
    }

    async fn controller(client: Arc<FakeClient>, settings: Settings) -> ChatController {
        let repository = Arc::new(ChatRepository::open(StoreLocation::InMemory).await.unwrap());
        ChatController::new(repository, client, settings)
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let client = FakeClient::new(|| Ok(response(&["unused"])));
        let mut controller = controller(client.clone(), settings_with_key()).await;
        let mut session = controller.new_chat().await;

        assert!(controller.send_message(&mut session, "  \n\t ").await.is_none());

        assert!(session.is_empty());
        assert!(client.requests.lock().is_empty());
        let stored = controller.repository().find_by_id(session.id()).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_successful_exchange() {
        let client = FakeClient::new(|| Ok(response(&["Hello there", "ignored"])));
        let mut controller = controller(client.clone(), settings_with_key()).await;
        let mut session = controller.new_chat().await;

        let exchange = controller
            .send_message(&mut session, "  Hi  ")
            .await
            .unwrap();

        assert_eq!(exchange.outcome, ReplyOutcome::Answered);
        assert_eq!(exchange.user.content(), "Hi");
        assert_eq!(exchange.reply.content(), "Hello there");
        assert_eq!(exchange.reply.author(), Author::Assistant);

        {
            let requests = client.requests.lock();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].0, "sk-test");
            assert_eq!(requests[0].1.messages.last().unwrap().content, "Hi");
        }

        let stored = controller.repository().find_by_id(session.id()).await.unwrap();
        let contents: Vec<&str> = stored.sorted_messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["Hi", "Hello there"]);
        assert_eq!(stored.title(), "Hi");
    }

    #[tokio::test]
    async fn test_missing_api_key_never_calls_client() {
        let client = FakeClient::new(|| Ok(response(&["unused"])));
        let mut controller = controller(client.clone(), Settings::default()).await;
        let mut session = controller.new_chat().await;

        let exchange = controller.send_message(&mut session, "Hi").await.unwrap();

        assert_eq!(exchange.outcome, ReplyOutcome::MissingApiKey);
        assert_eq!(exchange.reply.content(), MISSING_API_KEY_REPLY);
        assert!(client.requests.lock().is_empty());
        assert_eq!(session.message_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_choices_stores_placeholder() {
        let client = FakeClient::new(|| Ok(response(&[])));
        let mut controller = controller(client, settings_with_key()).await;
        let mut session = controller.new_chat().await;

        let exchange = controller.send_message(&mut session, "Hi").await.unwrap();

        assert_eq!(exchange.outcome, ReplyOutcome::Empty);
        assert_eq!(exchange.reply.content(), EMPTY_RESPONSE_REPLY);
    }

    #[tokio::test]
    async fn test_failure_stores_error_as_assistant_message() {
        let client = FakeClient::new(|| Err(CompletionError::Status(500)));
        let mut controller = controller(client, settings_with_key()).await;
        let mut session = controller.new_chat().await;

        let exchange = controller.send_message(&mut session, "Hi").await.unwrap();

        assert_eq!(
            exchange.outcome,
            ReplyOutcome::Failed("Invalid status code: 500".into())
        );
        assert_eq!(exchange.reply.content(), "Error: Invalid status code: 500");
        assert!(!exchange.reply.is_user());
    }

    #[tokio::test]
    async fn test_only_first_message_titles_the_session() {
        let client = FakeClient::new(|| Ok(response(&["ok"])));
        let mut controller = controller(client, settings_with_key()).await;
        let mut session = controller.new_chat().await;

        controller
            .send_message(&mut session, "Tell me about the borrow checker please")
            .await;
        controller.send_message(&mut session, "Something else").await;

        assert_eq!(session.title(), "Tell me about the bo...");
        let stored = controller.repository().find_by_id(session.id()).await.unwrap();
        assert_eq!(stored.title(), "Tell me about the bo...");
        assert_eq!(stored.message_count(), 4);
    }

    #[tokio::test]
    async fn test_exchange_bumps_last_modified() {
        let client = FakeClient::new(|| Ok(response(&["ok"])));
        let mut controller = controller(client, settings_with_key()).await;
        let mut session = controller.new_chat().await;
        let before = session.last_modified_at();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let exchange = controller.send_message(&mut session, "Hi").await.unwrap();

        assert!(session.last_modified_at() > before);
        assert!(session.last_modified_at() >= exchange.reply.timestamp());
    }

    #[tokio::test]
    async fn test_ensure_session_creates_once() {
        let client = FakeClient::new(|| Ok(response(&["ok"])));
        let controller = controller(client, settings_with_key()).await;

        let first = controller.ensure_session().await;
        let second = controller.ensure_session().await;

        assert_eq!(first.id(), second.id());
        assert_eq!(first.title(), DEFAULT_SESSION_TITLE);
    }

    #[tokio::test]
    async fn test_new_chat_reuses_empty_session() {
        let client = FakeClient::new(|| Ok(response(&["ok"])));
        let mut controller = controller(client, settings_with_key()).await;
        let mut busy = controller.new_chat().await;
        controller.send_message(&mut busy, "Hi").await;

        let fresh = controller.new_chat().await;
        let again = controller.new_chat().await;

        assert_ne!(fresh.id(), busy.id());
        assert_eq!(fresh.id(), again.id());
    }

    #[tokio::test]
    async fn test_settings_can_be_swapped() {
        let client = FakeClient::new(|| Ok(response(&["ok"])));
        let mut controller = controller(client.clone(), Settings::default()).await;
        let mut session = controller.new_chat().await;

        controller.set_settings(Settings {
            model: "gpt-other".into(),
            ..settings_with_key()
        });
        controller.send_message(&mut session, "Hi").await;

        assert_eq!(controller.settings().model, "gpt-other");
        assert_eq!(client.requests.lock()[0].1.model, "gpt-other");
    }
}
