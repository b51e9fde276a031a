use chrono::{DateTime, Utc};

use studyhall_lib::flashcards::algorithm::format_interval;
use studyhall_lib::flashcards::{Flashcard, IntervalPreview, ReviewLabel};

/// ANSI color codes
#[allow(dead_code)]
pub struct Color;

#[allow(dead_code)]
impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Relative description of a due date ("due now", "in 3d")
pub fn describe_due(next_review_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match next_review_at {
        None => "due now".to_string(),
        Some(due) if due <= now => "due now".to_string(),
        Some(due) => {
            let days = (due - now).num_days();
            if days < 1 {
                "later today".to_string()
            } else {
                format!("in {}", format_interval(u32::try_from(days).unwrap_or(u32::MAX)))
            }
        }
    }
}

/// One-line summary of a card's schedule
pub fn render_schedule(card: &Flashcard, use_color: bool) -> String {
    let stats = format!(
        "reps {} · interval {} · ease {:.2}",
        card.schedule.repetition_count,
        format_interval(card.schedule.interval_days),
        card.schedule.ease
    );
    paint(&stats, Color::GRAY, use_color)
}

/// Review buttons with the interval each would give
pub fn render_preview(preview: &IntervalPreview, use_color: bool) -> String {
    ReviewLabel::ALL
        .iter()
        .map(|label| {
            let color = match label {
                ReviewLabel::Again => Color::RED,
                ReviewLabel::Hard => Color::YELLOW,
                ReviewLabel::Good => Color::BLUE,
                ReviewLabel::Easy => Color::GREEN,
            };
            format!(
                "{} ({})",
                paint(label.as_str(), color, use_color),
                format_interval(preview.get(*label))
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}
