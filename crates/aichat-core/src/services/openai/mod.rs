pub mod client;
pub mod error;
pub mod models;

pub use client::{
    BoxFuture, CompletionCallback, CompletionClient, OPENAI_CHAT_COMPLETIONS_URL, OpenAiClient,
};
pub use error::{CompletionError, CompletionResult};
pub use models::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, ChoiceMessage, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, Role, create_request,
};
