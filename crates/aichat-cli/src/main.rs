use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use aichat_core::SessionSort;

mod commands;

#[derive(Parser)]
#[command(name = "aichat")]
#[command(about = "Chat with OpenAI models and keep the history locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List chat sessions
    List {
        /// Show archived sessions instead of active ones
        #[arg(long)]
        archived: bool,
        #[arg(long, value_enum, default_value_t = SortArg::Modified)]
        sort: SortArg,
    },
    /// Start a new chat, reusing an empty one if there is one
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// Print a session's messages
    Show { id: String },
    /// Send a message and print the reply
    Send {
        /// Session id or unique prefix
        #[arg(required_unless_present = "latest")]
        id: Option<String>,
        text: Vec<String>,
        /// Send to the most recently modified session; every argument is text
        #[arg(long)]
        latest: bool,
    },
    Rename { id: String, title: String },
    Archive { id: String },
    Unarchive { id: String },
    Delete { id: String },
    /// Delete every session and message
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Check that the database is reachable
    Health,
    /// Interactive chat
    Chat { id: Option<String> },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetKey { key: String },
    ClearKey,
    SetModel { model: String },
    /// Set the system prompt; an empty prompt disables it
    SetPrompt { prompt: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Modified,
    ModifiedAsc,
    Created,
    CreatedAsc,
    Title,
}

impl From<SortArg> for SessionSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Modified => SessionSort::LastModifiedDesc,
            SortArg::ModifiedAsc => SessionSort::LastModifiedAsc,
            SortArg::Created => SessionSort::CreatedDesc,
            SortArg::CreatedAsc => SessionSort::CreatedAsc,
            SortArg::Title => SessionSort::TitleAsc,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Settings commands must work even when the database cannot be opened
    let command = match cli.command {
        Commands::Config { action } => return run_config(action).await,
        command => command,
    };

    let mut app = commands::App::init().await?;

    match command {
        Commands::List { archived, sort } => {
            commands::sessions::list(&app, archived, sort.into()).await?
        }
        Commands::New { title } => commands::sessions::new(&app, title).await?,
        Commands::Show { id } => commands::sessions::show(&app, &id).await?,
        Commands::Send { id, text, latest } => {
            let (target, words) = if latest {
                (None, id.into_iter().chain(text).collect::<Vec<_>>())
            } else {
                (id, text)
            };
            commands::sessions::send(&mut app, target.as_deref(), &words.join(" ")).await?
        }
        Commands::Rename { id, title } => commands::sessions::rename(&app, &id, &title).await?,
        Commands::Archive { id } => commands::sessions::set_archived(&app, &id, true).await?,
        Commands::Unarchive { id } => commands::sessions::set_archived(&app, &id, false).await?,
        Commands::Delete { id } => commands::sessions::delete(&app, &id).await?,
        Commands::Reset { yes } => commands::sessions::reset(&app, yes).await?,
        Commands::Health => commands::sessions::health(&app).await?,
        Commands::Chat { id } => commands::chat::run(&mut app, id.as_deref()).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => commands::config::show().await,
        ConfigAction::SetKey { key } => commands::config::set_key(Some(key)).await,
        ConfigAction::ClearKey => commands::config::set_key(None).await,
        ConfigAction::SetModel { model } => commands::config::set_model(model).await,
        ConfigAction::SetPrompt { prompt } => commands::config::set_prompt(prompt).await,
    }
}
