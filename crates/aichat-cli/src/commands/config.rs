use anyhow::{Context, Result};

use aichat_core::{Settings, SettingsJsonRepository, SettingsRepository};

use super::API_KEY_ENV;

fn repository() -> Result<SettingsJsonRepository> {
    SettingsJsonRepository::new().context("Failed to locate settings")
}

async fn update(change: impl FnOnce(&mut Settings)) -> Result<()> {
    let repository = repository()?;
    let mut settings = repository.load().await.context("Failed to read settings")?;
    change(&mut settings);
    repository
        .save(settings)
        .await
        .with_context(|| format!("Failed to write {}", repository.path().display()))?;
    println!("Saved {}", repository.path().display());
    Ok(())
}

fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}

pub async fn show() -> Result<()> {
    let repository = repository()?;
    let settings = repository.load().await.context("Failed to read settings")?;

    println!("file:          {}", repository.path().display());
    let key = match settings.api_key() {
        Some(key) => mask(key),
        None => "(not set)".to_string(),
    };
    println!("api key:       {}", key);
    if std::env::var(API_KEY_ENV).is_ok_and(|k| !k.trim().is_empty()) {
        println!("               overridden by ${}", API_KEY_ENV);
    }
    println!("model:         {}", settings.model);
    println!(
        "system prompt: {}",
        settings.system_prompt().unwrap_or("(none)")
    );
    println!("temperature:   {}", settings.temperature);
    println!("max tokens:    {}", settings.max_tokens);
    println!("endpoint:      {}", settings.api_endpoint);
    match settings.store_location() {
        Ok(location) => println!("database:      {:?}", location),
        Err(e) => println!("database:      unavailable ({})", e),
    }
    Ok(())
}

pub async fn set_key(key: Option<String>) -> Result<()> {
    let key = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
    update(|settings| settings.openai_api_key = key).await
}

pub async fn set_model(model: String) -> Result<()> {
    update(|settings| settings.model = model.trim().to_string()).await
}

pub async fn set_prompt(prompt: String) -> Result<()> {
    let prompt = Some(prompt.trim().to_string()).filter(|p| !p.is_empty());
    update(|settings| settings.system_prompt = prompt).await
}
