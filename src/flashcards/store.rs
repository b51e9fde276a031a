//! Card store contract
//!
//! The review controller only talks to persistence through [`CardStore`], so
//! the SQLite store and the in-memory store are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::models::{Flashcard, ScheduleUpdate};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Deck not found: {0}")]
    DeckNotFound(Uuid),

    #[error("Card not found: {0}")]
    CardNotFound(Uuid),

    #[error("Card {card_id} changed concurrently (expected revision {expected}, found {found})")]
    Conflict {
        card_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("Card store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(_) | StoreError::Unavailable(_) | StoreError::Conflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A card together with the learner who owns its deck
#[derive(Debug, Clone)]
pub struct OwnedCard {
    pub card: Flashcard,
    pub owner_id: Uuid,
}

#[async_trait]
pub trait CardStore: Send + Sync {
    /// Ids of every deck owned by `owner_id`
    async fn owned_deck_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>>;

    /// Cards in the given decks, ordered by due date (unset first), then
    /// position, then id. With `due_at` set, only cards due at that instant.
    ///
    /// An empty `deck_ids` yields an empty list.
    async fn cards_in_decks(
        &self,
        deck_ids: &[Uuid],
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Flashcard>>;

    /// Point lookup; `None` when the id does not resolve
    async fn get_card(&self, card_id: Uuid) -> Result<Option<OwnedCard>>;

    /// Atomically write new scheduling fields if the card is still at
    /// `expected_revision`. Returns the card as stored after the write.
    async fn update_schedule(
        &self,
        card_id: Uuid,
        expected_revision: u64,
        update: &ScheduleUpdate,
    ) -> Result<Flashcard>;
}

/// Ordering shared by every store for due-card results
pub(crate) fn sort_due_order(cards: &mut [Flashcard]) {
    cards.sort_by(|a, b| {
        a.next_review_at
            .cmp(&b.next_review_at)
            .then(a.position.cmp(&b.position))
            .then(a.id.cmp(&b.id))
    });
}
