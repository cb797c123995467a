use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use aichat_core::models::Message;
use aichat_core::{
    ChatController, ChatRepository, OpenAiClient, Session, Settings, SettingsJsonRepository,
    SettingsRepository, StoreLocation,
};

pub mod chat;
pub mod config;
pub mod sessions;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Everything a command needs, wired once at startup
pub struct App {
    pub controller: ChatController,
}

impl App {
    pub async fn init() -> Result<Self> {
        let settings = load_settings().await?;

        let location = settings.store_location().unwrap_or_else(|e| {
            warn!(error = %e, "No database location, using in-memory store");
            StoreLocation::InMemory
        });
        let repository = ChatRepository::open(location)
            .await
            .context("Failed to open chat database")?;
        if repository.store().is_fallback() {
            warn!("Using a temporary in-memory database; history will not be saved");
        }

        let client = OpenAiClient::with_endpoint(&settings.api_endpoint)
            .context("Invalid API endpoint in settings")?;
        info!(endpoint = %client.endpoint(), model = %settings.model, "Chat client ready");

        Ok(Self {
            controller: ChatController::new(Arc::new(repository), Arc::new(client), settings),
        })
    }

    pub fn repository(&self) -> &Arc<ChatRepository> {
        self.controller.repository()
    }

    /// Find a session by full id or unique id prefix
    pub async fn resolve(&self, id: &str) -> Result<Session> {
        let sessions = self.repository().fetch_all(None).await;
        match_session(sessions, id)
    }
}

/// Pick the one session whose id starts with `id`, ignoring case
fn match_session(sessions: Vec<Session>, id: &str) -> Result<Session> {
    let needle = id.trim().to_ascii_lowercase();
    if needle.is_empty() {
        bail!("Session id must not be empty");
    }

    let mut matches: Vec<Session> = sessions
        .into_iter()
        .filter(|s| s.id().to_string().starts_with(&needle))
        .collect();

    match matches.len() {
        0 => bail!("No session matches '{}'", id),
        1 => Ok(matches.remove(0)),
        n => bail!("'{}' is ambiguous: {} sessions match", id, n),
    }
}

/// Stored settings, with the key from the environment taking precedence
pub async fn load_settings() -> Result<Settings> {
    let mut settings = match SettingsJsonRepository::new() {
        Ok(repository) => repository
            .load()
            .await
            .with_context(|| format!("Failed to read {}", repository.path().display()))?,
        Err(e) => {
            warn!(error = %e, "No settings location, using defaults");
            Settings::default()
        }
    };

    if let Ok(key) = std::env::var(API_KEY_ENV)
        && !key.trim().is_empty()
    {
        settings.openai_api_key = Some(key);
    }

    Ok(settings)
}

pub fn short_id(session: &Session) -> String {
    session.id().to_string()[..8].to_string()
}

pub fn print_session_line(session: &Session) {
    println!(
        "{}  {}  {:>3} msgs  {}{}",
        short_id(session),
        session.last_modified_at().format("%Y-%m-%d %H:%M"),
        session.message_count(),
        session.title(),
        if session.is_archived() { "  [archived]" } else { "" },
    );
}

pub fn print_message(message: &Message) {
    println!("[{}] {}", message.author().label(), message.content());
}
