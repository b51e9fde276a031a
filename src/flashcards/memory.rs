//! In-memory card store, used by tests and as a stand-in for the database

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Deck, Flashcard, ScheduleUpdate};
use super::store::{sort_due_order, CardStore, OwnedCard, Result, StoreError};

#[derive(Default)]
struct Tables {
    decks: HashMap<Uuid, Deck>,
    cards: HashMap<Uuid, Flashcard>,
}

/// Card store held entirely in memory
#[derive(Default)]
pub struct MemoryCardStore {
    tables: Mutex<Tables>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Create a new deck
    pub fn create_deck(&self, owner_id: Uuid, name: &str) -> Result<Deck> {
        let deck = Deck::new(owner_id, name.to_string());
        self.lock()?.decks.insert(deck.id, deck.clone());
        Ok(deck)
    }

    /// Create a new card with default scheduling state at the end of the deck
    pub fn add_card(&self, deck_id: Uuid, front: &str, back: &str) -> Result<Flashcard> {
        let mut tables = self.lock()?;
        if !tables.decks.contains_key(&deck_id) {
            return Err(StoreError::DeckNotFound(deck_id));
        }

        let mut card = Flashcard::new(deck_id, front.to_string(), back.to_string());
        card.position = tables.cards.values().filter(|c| c.deck_id == deck_id).count() as i32;
        tables.cards.insert(card.id, card.clone());
        Ok(card)
    }

    /// Insert or replace a card as-is
    pub fn put_card(&self, card: Flashcard) -> Result<()> {
        let mut tables = self.lock()?;
        if !tables.decks.contains_key(&card.deck_id) {
            return Err(StoreError::DeckNotFound(card.deck_id));
        }
        tables.cards.insert(card.id, card);
        Ok(())
    }
}

#[async_trait]
impl CardStore for MemoryCardStore {
    async fn owned_deck_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>> {
        let tables = self.lock()?;
        let mut ids: Vec<Uuid> = tables
            .decks
            .values()
            .filter(|d| d.owner_id == owner_id)
            .map(|d| d.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn cards_in_decks(
        &self,
        deck_ids: &[Uuid],
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Flashcard>> {
        if deck_ids.is_empty() {
            return Ok(Vec::new());
        }

        let tables = self.lock()?;
        let mut cards: Vec<Flashcard> = tables
            .cards
            .values()
            .filter(|c| deck_ids.contains(&c.deck_id))
            .filter(|c| due_at.map_or(true, |now| c.is_due_at(now)))
            .cloned()
            .collect();
        sort_due_order(&mut cards);
        Ok(cards)
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<OwnedCard>> {
        let tables = self.lock()?;
        let Some(card) = tables.cards.get(&card_id) else {
            return Ok(None);
        };
        let deck = tables
            .decks
            .get(&card.deck_id)
            .ok_or(StoreError::DeckNotFound(card.deck_id))?;
        Ok(Some(OwnedCard {
            card: card.clone(),
            owner_id: deck.owner_id,
        }))
    }

    async fn update_schedule(
        &self,
        card_id: Uuid,
        expected_revision: u64,
        update: &ScheduleUpdate,
    ) -> Result<Flashcard> {
        let mut tables = self.lock()?;
        let card = tables
            .cards
            .get_mut(&card_id)
            .ok_or(StoreError::CardNotFound(card_id))?;

        if card.revision != expected_revision {
            return Err(StoreError::Conflict {
                card_id,
                expected: expected_revision,
                found: card.revision,
            });
        }

        card.apply(update);
        Ok(card.clone())
    }
}
