//! CLI interface for marathon-bot

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::bot;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::store::{ProgressStore, SqliteProgressStore};

#[derive(Parser)]
#[command(name = "marathon-bot")]
#[command(about = "Telegram companion for 30-day habit marathons", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the SQLite progress database (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Telegram bot token (overrides config)
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot: rehydrate reminders and poll for updates (default)
    Run,
    /// List the marathons in the catalog
    Marathons,
    /// Show stats from the progress database
    Stats,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(db) = cli.db {
        config.storage.db_path = Some(db);
    }
    if let Some(token) = cli.token {
        config.telegram.bot_token = Some(token);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => bot::run(&config).await,
        Commands::Marathons => {
            let catalog = Catalog::builtin_shared();
            for program in catalog.list() {
                let tag = if program.premium { "premium" } else { "free" };
                println!(
                    "{:<12} {:<12} [{}] {}",
                    program.key, program.title, tag, program.description
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let store = SqliteProgressStore::open(config.storage.db_path()).await?;
            let users = store.user_count().await?;
            let reminders = store.scan_reminders().await?.len();
            println!("users:     {users}");
            println!("reminders: {reminders}");
            Ok(())
        }
    }
}
