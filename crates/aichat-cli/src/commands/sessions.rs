use anyhow::{Result, bail};

use aichat_core::{ReplyOutcome, SessionFilter, SessionSort, StoreLocation};

use super::{App, print_message, print_session_line, short_id};

pub async fn list(app: &App, archived: bool, sort: SessionSort) -> Result<()> {
    let sessions = app
        .repository()
        .fetch_filtered(SessionFilter::Archived(archived), sort)
        .await;

    if sessions.is_empty() {
        println!("No {} sessions", if archived { "archived" } else { "active" });
    }
    for session in &sessions {
        print_session_line(session);
    }
    Ok(())
}

pub async fn new(app: &App, title: Option<String>) -> Result<()> {
    let mut session = app.controller.new_chat().await;
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        app.repository().rename_session(&mut session, title.trim()).await;
    }
    print_session_line(&session);
    Ok(())
}

pub async fn show(app: &App, id: &str) -> Result<()> {
    let session = app.resolve(id).await?;
    println!("{} ({})", session.title(), session.id());
    for message in session.sorted_messages() {
        print_message(message);
    }
    Ok(())
}

/// Send to the session matching `id`, or to the most recent one
pub async fn send(app: &mut App, id: Option<&str>, text: &str) -> Result<()> {
    let mut session = match id {
        Some(id) => app.resolve(id).await?,
        None => app.controller.ensure_session().await,
    };

    let Some(exchange) = app.controller.send_message(&mut session, text).await else {
        bail!("Nothing to send");
    };

    print_message(&exchange.reply);
    match exchange.outcome {
        ReplyOutcome::Failed(_) => bail!("Request failed"),
        ReplyOutcome::MissingApiKey => bail!("No API key; run `aichat config set-key`"),
        ReplyOutcome::Answered | ReplyOutcome::Empty => Ok(()),
    }
}

pub async fn rename(app: &App, id: &str, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Title must not be empty");
    }
    let mut session = app.resolve(id).await?;
    app.repository().rename_session(&mut session, title).await;
    print_session_line(&session);
    Ok(())
}

pub async fn set_archived(app: &App, id: &str, archived: bool) -> Result<()> {
    let mut session = app.resolve(id).await?;
    app.repository().set_archived(&mut session, archived).await;
    print_session_line(&session);
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    let session = app.resolve(id).await?;
    app.repository().delete_session(&session).await;
    println!("Deleted {} {}", short_id(&session), session.title());
    Ok(())
}

pub async fn reset(app: &App, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("This deletes every session; pass --yes to confirm");
    }
    let session = app.repository().reset_database().await;
    println!("Database reset");
    print_session_line(&session);
    Ok(())
}

pub async fn health(app: &App) -> Result<()> {
    let location = match app.repository().store().location() {
        StoreLocation::InMemory => "in-memory".to_string(),
        StoreLocation::File(path) => path.display().to_string(),
    };

    if app.repository().health_check().await {
        println!("ok ({})", location);
        Ok(())
    } else {
        bail!("Database health check failed ({})", location)
    }
}
