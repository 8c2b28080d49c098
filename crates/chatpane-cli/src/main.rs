mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use chatpane_core::config::AppConfig;
use chatpane_core::repositories::{
    ConversationRepository, InMemoryConversationRepository, InMemoryPreferencesRepository,
    PreferencesJsonRepository, PreferencesRepository, SqliteConversationRepository,
};
use chatpane_core::services::{HttpCompletionBackend, StaticSessionProvider};
use chatpane_core::{ChatController, logging};

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal chat client with personas and streamed replies", long_about = None)]
struct Args {
    /// Signed-in user id; without it conversations stay local
    #[arg(long)]
    user: Option<String>,

    /// Persona to chat with (default, developer, writer, teacher, friend)
    #[arg(long)]
    persona: Option<String>,

    /// Completion endpoint URL
    #[arg(long)]
    url: Option<String>,

    /// SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Keep everything in memory, nothing is written to disk
    #[arg(long)]
    in_memory: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => AppConfig::load().context("Failed to load config")?,
    };

    if let Some(url) = &args.url {
        config.completion_url = url.clone();
    }
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let diagnostics = logging::init(&config.log_filter).context("Failed to initialize logging")?;
    info!(url = %config.completion_url, "Starting chatpane");

    let (repository, preferences): (Arc<dyn ConversationRepository>, Arc<dyn PreferencesRepository>) =
        if args.in_memory {
            (
                Arc::new(InMemoryConversationRepository::new()),
                Arc::new(InMemoryPreferencesRepository::new()),
            )
        } else {
            let repository = SqliteConversationRepository::open(&config.database_path)
                .await
                .with_context(|| {
                    format!("Failed to open database {}", config.database_path.display())
                })?;
            (
                Arc::new(repository),
                Arc::new(PreferencesJsonRepository::at(&config.preferences_path)),
            )
        };

    let backend = HttpCompletionBackend::new(
        config.completion_url.clone(),
        config.engine.request_timeout(),
    )
    .context("Failed to create HTTP client")?;

    let controller = ChatController::new(
        repository,
        Arc::new(backend),
        Arc::new(StaticSessionProvider::new(args.user.clone())),
        preferences,
        config.engine.clone(),
    );
    controller.start().await;

    if let Some(persona) = &args.persona
        && !controller.change_persona(persona).await
    {
        eprintln!("Unknown persona '{}', keeping {}", persona, controller.current_persona().id);
    }

    let (session_tx, session_rx) = mpsc::channel(8);
    tokio::spawn(controller.bridge().clone().run(session_rx));
    let printer = tokio::spawn(repl::print_replies(controller.engine().subscribe()));

    repl::run(&controller, &diagnostics, session_tx).await?;

    controller.engine().stop_all();
    printer.abort();
    info!("Exiting chatpane");
    Ok(())
}
