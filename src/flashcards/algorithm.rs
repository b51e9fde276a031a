//! SM-2 Spaced Repetition Algorithm
//!
//! Adapted SuperMemo 2: a lapse resets the streak and interval but leaves
//! the ease factor alone, and a success grows the interval by the ease
//! factor the card had *before* this review.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation

use chrono::{DateTime, Duration, Utc};

use super::models::{
    IntervalPreview, Quality, ReviewLabel, ScheduleUpdate, SchedulingState, MIN_EASE,
};

/// Calculate the next scheduling state for a review of the given quality.
///
/// Total over the documented domain: `interval_days >= 1` and
/// `ease >= 1.3`. Quality is already range-checked by [`Quality`].
pub fn next_state(state: &SchedulingState, quality: Quality) -> SchedulingState {
    debug_assert!(state.is_valid(), "scheduler input out of domain: {:?}", state);

    if quality.is_lapse() {
        return SchedulingState {
            repetition_count: 0,
            interval_days: 1,
            ease: state.ease,
        };
    }

    let repetition_count = state.repetition_count.saturating_add(1);
    let interval_days = match repetition_count {
        1 => 1,
        2 => 6,
        _ => grow_interval(state.interval_days, state.ease),
    };

    // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
    let miss = f64::from(Quality::MAX - quality.value());
    let ease = (state.ease + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE);

    SchedulingState {
        repetition_count,
        interval_days,
        ease: round_ease(ease),
    }
}

/// Run the scheduler and stamp the result with review and due timestamps
pub fn apply_review(
    state: &SchedulingState,
    quality: Quality,
    reviewed_at: DateTime<Utc>,
) -> ScheduleUpdate {
    let schedule = next_state(state, quality);
    ScheduleUpdate {
        schedule,
        last_reviewed: reviewed_at,
        next_review_at: reviewed_at + Duration::days(i64::from(schedule.interval_days)),
    }
}

/// Calculate the preview intervals for each review button
/// Used to show users what interval each rating would give
pub fn preview_intervals(state: &SchedulingState) -> IntervalPreview {
    let interval = |label: ReviewLabel| next_state(state, label.quality()).interval_days;

    IntervalPreview {
        again: interval(ReviewLabel::Again),
        hard: interval(ReviewLabel::Hard),
        good: interval(ReviewLabel::Good),
        easy: interval(ReviewLabel::Easy),
    }
}

fn grow_interval(interval_days: u32, ease: f64) -> u32 {
    // f64::round rounds half away from zero
    let grown = (f64::from(interval_days) * ease).round();
    if grown >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (grown as u32).max(1)
    }
}

fn round_ease(ease: f64) -> f64 {
    (ease * 100.0).round() / 100.0
}

/// Format an interval in days to a human-readable string
pub fn format_interval(days: u32) -> String {
    if days == 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}
