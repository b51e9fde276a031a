use anyhow::Result;
use uuid::Uuid;

use studyhall_lib::flashcards::algorithm::format_interval;

use crate::app::App;
use crate::render::terminal::{render_preview, render_schedule};
use crate::OutputFormat;

/// Split a CLI rating into a numeric quality or a label
pub fn parse_rating(rating: &str) -> (Option<i64>, Option<&str>) {
    match rating.trim().parse::<i64>() {
        Ok(quality) => (Some(quality), None),
        Err(_) => (None, Some(rating)),
    }
}

pub async fn run(app: &App, card_id: Uuid, rating: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let learner = app.learner()?;
    let (quality, label) = parse_rating(rating);
    let card = app.controller.submit_input(learner, card_id, quality, label).await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "flashcard": card });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Reviewed \"{}\"", card.front);
            println!("  {}", render_schedule(&card, use_color));
            println!(
                "  Next review in {}",
                format_interval(card.schedule.interval_days)
            );
        }
    }
    Ok(())
}

pub async fn run_preview(app: &App, card_id: Uuid, format: &OutputFormat, use_color: bool) -> Result<()> {
    let learner = app.learner()?;
    let preview = app.controller.preview(learner, card_id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Plain => println!("{}", render_preview(&preview, use_color)),
    }
    Ok(())
}
