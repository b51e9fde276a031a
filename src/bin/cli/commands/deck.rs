use anyhow::{Context, Result};
use uuid::Uuid;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run_create(app: &App, name: &str, description: Option<String>, format: &OutputFormat) -> Result<()> {
    let learner = app.learner()?;
    let deck = app
        .store
        .create_deck(learner.id, name, description)
        .context("Failed to create deck")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&deck)?),
        OutputFormat::Plain => {
            println!("Created deck \"{}\"", deck.name);
            println!("  ID: {}", deck.id);
        }
    }
    Ok(())
}

pub fn run_list(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let learner = app.learner()?;
    let decks = app.store.list_decks(learner.id).context("Failed to list decks")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decks)?),
        OutputFormat::Plain => {
            if decks.is_empty() {
                println!("No decks yet. Create one with `studyhall-cli deck create <name>`.");
                return Ok(());
            }

            let name_width = decks.iter().map(|d| d.name.len()).max().unwrap_or(4).clamp(4, 40);
            println!("{:<nw$} {}", "Name", "ID", nw = name_width);
            for deck in &decks {
                println!("{:<nw$} {}", deck.name, paint(&deck.id.to_string(), Color::GRAY, use_color), nw = name_width);
                if let Some(description) = &deck.description {
                    println!("{:<nw$}   {}", "", description, nw = name_width);
                }
            }
        }
    }
    Ok(())
}

pub fn run_add_card(app: &App, deck_id: Uuid, front: &str, back: &str, format: &OutputFormat) -> Result<()> {
    app.ensure_deck_owned(deck_id)?;
    let card = app
        .store
        .add_card(deck_id, front, back)
        .context("Failed to add card")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&card)?),
        OutputFormat::Plain => {
            println!("Added card to deck {}", deck_id);
            println!("  ID: {}", card.id);
        }
    }
    Ok(())
}
