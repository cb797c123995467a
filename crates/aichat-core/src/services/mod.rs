pub mod chat_service;
pub mod openai;

pub use chat_service::{ChatController, Exchange, ReplyOutcome};
