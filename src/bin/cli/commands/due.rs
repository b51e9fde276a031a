use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use studyhall_lib::flashcards::DueQuery;

use crate::app::App;
use crate::render::terminal::{describe_due, render_schedule};
use crate::OutputFormat;

pub async fn run(app: &App, decks: Vec<Uuid>, all: bool, format: &OutputFormat, use_color: bool) -> Result<()> {
    let learner = app.learner()?;
    let mut query = DueQuery::decks(decks);
    if all {
        query = query.all_cards();
    }

    let cards = app.controller.load_due_queue(learner, &query).await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "flashcards": cards });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if cards.is_empty() {
                println!("No due flashcards. Great job!");
                return Ok(());
            }

            let now = Utc::now();
            let front_width = cards.iter().map(|c| c.front.len()).max().unwrap_or(5).clamp(5, 40);
            for card in &cards {
                let front: String = card.front.chars().take(front_width).collect();
                println!(
                    "{:<fw$}  {:<11} {}  {}",
                    front,
                    describe_due(card.next_review_at, now),
                    render_schedule(card, use_color),
                    card.id,
                    fw = front_width
                );
            }
            println!("\n{} card(s)", cards.len());
        }
    }
    Ok(())
}
