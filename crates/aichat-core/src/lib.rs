//! Local chat history with a chat-completion backend.
//!
//! Sessions and their messages live in a SQLite store behind
//! [`ChatRepository`], which is the only write path and announces every
//! mutation on a broadcast channel. [`SessionCache`] mirrors the session list
//! for display, and [`ChatController`] ties the repository to a
//! [`CompletionClient`] for the send-message flow.

pub mod cache;
pub mod models;
pub mod repositories;
pub mod services;
pub mod settings;
pub mod storage;

pub use cache::SessionCache;
pub use models::{Author, Message, Session, SessionFilter, SessionSort};
pub use repositories::{ChatRepository, RepositoryEvent};
pub use services::openai::{CompletionClient, CompletionError, OpenAiClient};
pub use services::{ChatController, Exchange, ReplyOutcome};
pub use settings::{Settings, SettingsJsonRepository, SettingsRepository};
pub use storage::{Store, StoreError, StoreLocation};
