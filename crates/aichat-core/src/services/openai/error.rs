use thiserror::Error;

/// Why a chat completion did not produce a response
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request never got an HTTP response (DNS, connection, TLS, ...)
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered outside 200-299
    #[error("Invalid status code: {0}")]
    Status(u16),

    #[error("No data received from server")]
    EmptyBody,

    /// The body was not a chat completion response
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration error, raised before any network attempt
    #[error("Invalid endpoint {url:?}: {message}")]
    InvalidEndpoint { url: String, message: String },
}

impl CompletionError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CompletionError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

pub type CompletionResult<T> = Result<T, CompletionError>;
