use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use super::settings_model::Settings;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    Path(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub trait SettingsRepository: Send + Sync + 'static {
    /// Load settings; defaults when nothing has been saved yet
    fn load(&self) -> BoxFuture<'static, SettingsResult<Settings>>;

    fn save(&self, settings: Settings) -> BoxFuture<'static, SettingsResult<()>>;
}
