use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::services::openai::{
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE,
    OPENAI_CHAT_COMPLETIONS_URL,
};
use crate::storage::{StoreLocation, StoreResult};

/// User-editable configuration, persisted as JSON.
///
/// Fields missing from an older file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub api_endpoint: String,
    /// Database file; `None` uses the per-user default location
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_endpoint: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            database_path: None,
        }
    }
}

impl Settings {
    /// The API key, or `None` when unset or blank
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }

    pub fn store_location(&self) -> StoreResult<StoreLocation> {
        match &self.database_path {
            Some(path) => Ok(StoreLocation::File(path.clone())),
            None => StoreLocation::default_file(),
        }
    }
}
