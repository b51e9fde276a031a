//! Data models for the flashcard system

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower bound for the ease factor
pub const MIN_EASE: f64 = 1.3;

/// Ease factor given to a freshly created card
pub const DEFAULT_EASE: f64 = 2.5;

/// Interval given to a freshly created card (days)
pub const DEFAULT_INTERVAL_DAYS: u32 = 1;

/// A deck is a collection of flashcards owned by one learner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(owner_id: Uuid, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// The scheduling triple the SM-2 scheduler works on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    /// Consecutive successful reviews since the last lapse
    pub repetition_count: u32,
    /// Days until the card is due again
    pub interval_days: u32,
    /// Difficulty multiplier, never below [`MIN_EASE`]
    pub ease: f64,
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self {
            repetition_count: 0,
            interval_days: DEFAULT_INTERVAL_DAYS,
            ease: DEFAULT_EASE,
        }
    }
}

impl SchedulingState {
    /// Build a state from raw stored values.
    ///
    /// A missing or zero interval reads as 1 day and a missing ease as the
    /// default, matching how rows written before scheduling existed behave.
    pub fn from_stored(
        repetition_count: Option<u32>,
        interval_days: Option<u32>,
        ease: Option<f64>,
    ) -> Self {
        Self {
            repetition_count: repetition_count.unwrap_or(0),
            interval_days: interval_days.filter(|d| *d >= 1).unwrap_or(DEFAULT_INTERVAL_DAYS),
            ease: ease.unwrap_or(DEFAULT_EASE),
        }
    }

    /// Whether the state satisfies the scheduler's input domain
    pub fn is_valid(&self) -> bool {
        self.interval_days >= 1 && self.ease >= MIN_EASE && self.ease.is_finite()
    }
}

/// A flashcard with question (front), answer (back) and its review schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub front: String,
    pub back: String,
    #[serde(flatten)]
    pub schedule: SchedulingState,
    /// When the card is due; unset means due immediately
    pub next_review_at: Option<DateTime<Utc>>,
    pub last_reviewed: Option<DateTime<Utc>>,
    /// Bumped on every schedule update, used for optimistic writes
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    pub fn new(deck_id: Uuid, front: String, back: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deck_id,
            front,
            back,
            schedule: SchedulingState::default(),
            next_review_at: Some(now),
            last_reviewed: None,
            revision: 0,
            position: 0,
            created_at: now,
        }
    }

    /// Check if the card is due at `now`
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.map_or(true, |due| due <= now)
    }

    /// Check if the card is due for review
    pub fn is_due(&self) -> bool {
        self.is_due_at(Utc::now())
    }

    /// Copy a persisted update into this card
    pub fn apply(&mut self, update: &ScheduleUpdate) {
        self.schedule = update.schedule;
        self.last_reviewed = Some(update.last_reviewed);
        self.next_review_at = Some(update.next_review_at);
        self.revision += 1;
    }
}

/// Scheduling fields written back to the store after a review
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    #[serde(flatten)]
    pub schedule: SchedulingState,
    pub last_reviewed: DateTime<Utc>,
    pub next_review_at: DateTime<Utc>,
}

/// Recall quality on the SM-2 scale
///
/// - 0: complete blackout
/// - 1: incorrect, but recognized once shown
/// - 2: incorrect, but the answer felt familiar
/// - 3: correct with serious difficulty
/// - 4: correct after hesitation
/// - 5: perfect recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    /// Validate a raw score
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Quality below 3 resets the repetition streak
    pub fn is_lapse(self) -> bool {
        self.0 < 3
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Quality::new(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("quality {} is outside 0..=5", raw)))
    }
}

/// Coarse review buttons shown to the learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewLabel {
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewLabel {
    pub const ALL: [ReviewLabel; 4] = [
        ReviewLabel::Again,
        ReviewLabel::Hard,
        ReviewLabel::Good,
        ReviewLabel::Easy,
    ];

    /// Canonical quality for the label
    pub fn quality(self) -> Quality {
        match self {
            ReviewLabel::Again => Quality(0),
            ReviewLabel::Hard => Quality(2),
            ReviewLabel::Good => Quality(4),
            ReviewLabel::Easy => Quality(5),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewLabel::Again => "again",
            ReviewLabel::Hard => "hard",
            ReviewLabel::Good => "good",
            ReviewLabel::Easy => "easy",
        }
    }
}

impl FromStr for ReviewLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(ReviewLabel::Again),
            "hard" => Ok(ReviewLabel::Hard),
            "good" => Ok(ReviewLabel::Good),
            "easy" => Ok(ReviewLabel::Easy),
            other => Err(format!("unknown review label '{}'", other)),
        }
    }
}

impl fmt::Display for ReviewLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which decks a due-card query looks at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeckScope {
    /// Every deck the learner owns
    #[default]
    Owned,
    /// An explicit filter, narrowed to the decks the learner owns
    Decks(Vec<Uuid>),
}

/// Parameters of a due-card query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueQuery {
    pub scope: DeckScope,
    /// Only return cards whose `next_review_at` has elapsed
    pub due_only: bool,
}

impl Default for DueQuery {
    fn default() -> Self {
        Self {
            scope: DeckScope::Owned,
            due_only: true,
        }
    }
}

impl DueQuery {
    pub fn decks(deck_ids: Vec<Uuid>) -> Self {
        Self {
            scope: if deck_ids.is_empty() {
                DeckScope::Owned
            } else {
                DeckScope::Decks(deck_ids)
            },
            due_only: true,
        }
    }

    pub fn all_cards(mut self) -> Self {
        self.due_only = false;
        self
    }
}

/// Intervals each review button would produce for a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPreview {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl IntervalPreview {
    pub fn get(&self, label: ReviewLabel) -> u32 {
        match label {
            ReviewLabel::Again => self.again,
            ReviewLabel::Hard => self.hard,
            ReviewLabel::Good => self.good,
            ReviewLabel::Easy => self.easy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_quality_bounds() {
        assert!(Quality::new(-1).is_none());
        assert!(Quality::new(6).is_none());
        assert_eq!(Quality::new(0).map(Quality::value), Some(0));
        assert_eq!(Quality::new(5).map(Quality::value), Some(5));
        assert!(Quality::new(2).unwrap().is_lapse());
        assert!(!Quality::new(3).unwrap().is_lapse());
    }

    #[test]
    fn test_quality_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Quality>("4").is_ok());
        assert!(serde_json::from_str::<Quality>("6").is_err());
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(ReviewLabel::Again.quality().value(), 0);
        assert_eq!(ReviewLabel::Hard.quality().value(), 2);
        assert_eq!(ReviewLabel::Good.quality().value(), 4);
        assert_eq!(ReviewLabel::Easy.quality().value(), 5);
        assert_eq!(" Good ".parse::<ReviewLabel>(), Ok(ReviewLabel::Good));
        assert!("meh".parse::<ReviewLabel>().is_err());
    }

    #[test]
    fn test_new_card_defaults() {
        let card = Flashcard::new(Uuid::new_v4(), "Q".to_string(), "A".to_string());
        assert_eq!(card.schedule.repetition_count, 0);
        assert_eq!(card.schedule.interval_days, 1);
        assert_eq!(card.schedule.ease, 2.5);
        assert_eq!(card.revision, 0);
        assert!(card.last_reviewed.is_none());
        assert!(card.is_due());
    }

    #[test]
    fn test_from_stored_fills_gaps() {
        let state = SchedulingState::from_stored(None, Some(0), None);
        assert_eq!(state, SchedulingState::default());
        assert!(state.is_valid());
    }

    #[test]
    fn test_unset_due_date_is_due() {
        let mut card = Flashcard::new(Uuid::new_v4(), "Q".to_string(), "A".to_string());
        card.next_review_at = None;
        assert!(card.is_due_at(Utc::now() - Duration::days(365)));

        card.next_review_at = Some(Utc::now() + Duration::hours(1));
        assert!(!card.is_due());
    }

    #[test]
    fn test_card_serializes_flat_schedule() {
        let card = Flashcard::new(Uuid::new_v4(), "Q".to_string(), "A".to_string());
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["repetitionCount"], 0);
        assert_eq!(json["intervalDays"], 1);
        assert_eq!(json["ease"], 2.5);
    }
}
