mod app;
mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use studyhall_lib::config::AppConfig;

#[derive(Parser)]
#[command(name = "studyhall-cli", about = "Studyhall flashcard review CLI", version)]
struct Cli {
    /// Path to config.toml (default: <config dir>/studyhall/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bearer token identifying the learner (falls back to STUDYHALL_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Deck management
    #[command(subcommand)]
    Deck(DeckCommand),

    /// Card management
    #[command(subcommand)]
    Card(CardCommand),

    /// List cards that are due for review
    Due {
        /// Restrict to these decks (repeatable)
        #[arg(long = "deck")]
        decks: Vec<Uuid>,
        /// Include cards that are not due yet
        #[arg(long)]
        all: bool,
    },

    /// Record a single review
    Review {
        /// Card ID
        card: Uuid,
        /// Quality 0-5 or one of again/hard/good/easy
        rating: String,
    },

    /// Show the interval each rating would give a card
    Preview {
        /// Card ID
        card: Uuid,
    },

    /// Work through due cards interactively
    Study {
        /// Restrict to these decks (repeatable)
        #[arg(long = "deck")]
        decks: Vec<Uuid>,
    },
}

#[derive(Subcommand)]
enum DeckCommand {
    /// Create a new deck
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List your decks
    List,
}

#[derive(Subcommand)]
enum CardCommand {
    /// Add a card to a deck
    Add {
        /// Deck ID
        deck: Uuid,
        /// Question side
        front: String,
        /// Answer side (use "-" to read from stdin)
        back: String,
    },
}

/// Resolve "-" as stdin
fn resolve_content(content: String) -> String {
    if content == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf).ok();
        buf.trim_end().to_string()
    } else {
        content
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    let use_color = !cli.no_color && atty_check();
    let token = cli.token.or_else(|| std::env::var("STUDYHALL_TOKEN").ok());
    let app = app::App::new(config, token.as_deref())?;

    match cli.command {
        Command::Deck(DeckCommand::Create { name, description }) => {
            commands::deck::run_create(&app, &name, description, &cli.format)?;
        }
        Command::Deck(DeckCommand::List) => {
            commands::deck::run_list(&app, &cli.format, use_color)?;
        }
        Command::Card(CardCommand::Add { deck, front, back }) => {
            let back = resolve_content(back);
            commands::deck::run_add_card(&app, deck, &front, &back, &cli.format)?;
        }
        Command::Due { decks, all } => {
            commands::due::run(&app, decks, all, &cli.format, use_color).await?;
        }
        Command::Review { card, rating } => {
            commands::review::run(&app, card, &rating, &cli.format, use_color).await?;
        }
        Command::Preview { card } => {
            commands::review::run_preview(&app, card, &cli.format, use_color).await?;
        }
        Command::Study { decks } => {
            commands::study::run(&app, decks, use_color).await?;
        }
    }

    Ok(())
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}
