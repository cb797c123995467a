use thiserror::Error;

#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store initialization failed: {message}")]
    InitializationError { message: String },

    #[error("Invalid stored data: {message}")]
    InvalidData { message: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
