use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use aichat_core::{ReplyOutcome, Session, SessionCache};

use super::{App, print_message, print_session_line};

enum Input<'a> {
    Quit,
    New,
    List,
    Unknown(&'a str),
    Text(&'a str),
}

fn parse(line: &str) -> Input<'_> {
    match line.trim() {
        "/quit" | "/exit" => Input::Quit,
        "/new" => Input::New,
        "/list" => Input::List,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        text => Input::Text(text),
    }
}

fn prompt(session: &Session) -> Result<()> {
    print!("{}> ", session.title());
    std::io::stdout().flush().context("Failed to write prompt")
}

/// Read lines from stdin and send each one until `/quit` or end of input
pub async fn run(app: &mut App, id: Option<&str>) -> Result<()> {
    let mut session = match id {
        Some(id) => app.resolve(id).await?,
        None => app.controller.ensure_session().await,
    };

    let cache = Arc::new(SessionCache::new(app.repository().clone()));
    let sync = cache.spawn_sync();

    println!("Chatting in '{}'. Commands: /new /list /quit", session.title());
    for message in session.sorted_messages() {
        print_message(message);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(&session)?;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        match parse(&line) {
            Input::Quit => break,
            Input::New => {
                session = app.controller.new_chat().await;
                println!("Started '{}'", session.title());
            }
            Input::List => {
                for listed in cache.sessions().iter().filter(|s| !s.is_archived()) {
                    print_session_line(listed);
                }
            }
            Input::Unknown(cmd) => println!("Unknown command {}", cmd),
            Input::Text(text) => {
                if let Some(exchange) = app.controller.send_message(&mut session, text).await {
                    print_message(&exchange.reply);
                    if exchange.outcome == ReplyOutcome::MissingApiKey {
                        println!("Set one with `aichat config set-key <key>` or ${}", super::API_KEY_ENV);
                    }
                }
            }
        }
        prompt(&session)?;
    }

    sync.abort();
    Ok(())
}
