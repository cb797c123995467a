pub mod chat_repository;
pub mod events;

pub use chat_repository::ChatRepository;
pub use events::RepositoryEvent;
