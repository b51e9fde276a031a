use std::io::Write;

use anyhow::Result;
use uuid::Uuid;

use studyhall_lib::flashcards::algorithm::{format_interval, preview_intervals};
use studyhall_lib::flashcards::{DueQuery, ReviewPhase, ReviewSession, SqliteCardStore};

use crate::app::App;
use crate::commands::review::parse_rating;
use crate::render::terminal::{paint, render_preview, render_schedule, Color};

/// Read one line from stdin; `None` on end of input
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut buf = String::new();
    if std::io::stdin().read_line(&mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim().to_string()))
}

pub async fn run(app: &App, decks: Vec<Uuid>, use_color: bool) -> Result<()> {
    let learner = app.learner()?.clone();
    let mut session = ReviewSession::start(app.controller.clone(), learner, &DueQuery::decks(decks)).await?;

    if session.is_over() {
        println!("No due flashcards. Great job!");
        return Ok(());
    }

    loop {
        match session.phase() {
            ReviewPhase::Presenting => present(&mut session, use_color)?,
            ReviewPhase::Revealed => rate(&mut session, use_color).await?,
            ReviewPhase::Finished => {
                println!("\nAll caught up! {} card(s) reviewed.", session.reviewed());
                break;
            }
            ReviewPhase::Abandoned | ReviewPhase::Submitting => {
                println!("\nSession closed after {} review(s).", session.reviewed());
                break;
            }
        }
    }
    Ok(())
}

fn present(session: &mut ReviewSession<SqliteCardStore>, use_color: bool) -> Result<()> {
    let (position, total) = session.progress();
    if let Some(card) = session.current() {
        println!("\n{} {}", paint(&format!("[{}/{}]", position, total), Color::DIM, use_color), paint(&card.front, Color::BOLD, use_color));
        println!("  {}", render_schedule(card, use_color));
    }

    match read_line("Enter to reveal, s to skip, q to quit> ")?.as_deref() {
        None | Some("q") => session.abandon(),
        Some("s") => session.skip()?,
        Some(_) => {
            let card = session.reveal()?;
            println!("  {}", paint(&card.back, Color::CYAN, use_color));
            println!("  {}", render_preview(&preview_intervals(&card.schedule), use_color));
        }
    }
    Ok(())
}

async fn rate(session: &mut ReviewSession<SqliteCardStore>, use_color: bool) -> Result<()> {
    let prompt = match session.pending_quality() {
        Some(quality) => format!("Rate 0-5 or again/hard/good/easy, r to retry {}, q to quit> ", quality),
        None => "Rate 0-5 or again/hard/good/easy, q to quit> ".to_string(),
    };

    let outcome = match read_line(&prompt)?.as_deref() {
        None | Some("q") => {
            session.abandon();
            return Ok(());
        }
        Some("") => return Ok(()),
        Some("r") => session.retry().await,
        Some(rating) => {
            let (quality, label) = parse_rating(rating);
            session.submit_input(quality, label).await
        }
    };

    match outcome {
        Ok(card) => println!(
            "  {} next review in {}",
            paint("saved,", Color::GREEN, use_color),
            format_interval(card.schedule.interval_days)
        ),
        Err(e) => {
            println!("  {}", paint(&e.to_string(), Color::RED, use_color));
            if e.is_retryable() {
                println!("  Your rating was kept; press r to try again.");
            }
        }
    }
    Ok(())
}
