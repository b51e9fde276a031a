//! SQLite-backed card store
//!
//! Timestamps are stored as unix milliseconds so that due-date comparisons
//! happen on integers inside SQLite.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::models::{Deck, Flashcard, ScheduleUpdate, SchedulingState};
use super::store::{CardStore, OwnedCard, Result, StoreError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS decks (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS flashcards (
        id TEXT PRIMARY KEY,
        deck_id TEXT NOT NULL REFERENCES decks(id) ON DELETE CASCADE,
        front TEXT NOT NULL,
        back TEXT NOT NULL,
        repetition_count INTEGER NOT NULL DEFAULT 0 CHECK (repetition_count >= 0),
        interval_days INTEGER NOT NULL DEFAULT 1 CHECK (interval_days >= 1),
        ease REAL NOT NULL DEFAULT 2.5 CHECK (ease >= 1.3),
        next_review_at INTEGER,
        last_reviewed INTEGER,
        revision INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_decks_owner ON decks(owner_id);
    CREATE INDEX IF NOT EXISTS idx_flashcards_due ON flashcards(deck_id, next_review_at);
"#;

const CARD_COLUMNS: &str = "c.id, c.deck_id, c.front, c.back, c.repetition_count, c.interval_days, \
     c.ease, c.next_review_at, c.last_reviewed, c.revision, c.position, c.created_at";

/// Card store over a single SQLite connection
pub struct SqliteCardStore {
    conn: Mutex<Connection>,
}

impl SqliteCardStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("Opening card store at {:?}", db_path);
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    // ==================== Deck Operations ====================

    /// Create a new deck
    pub fn create_deck(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<Deck> {
        let mut deck = Deck::new(owner_id, name.to_string());
        deck.description = description;

        self.lock()?.execute(
            "INSERT INTO decks (id, owner_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                deck.id.to_string(),
                owner_id.to_string(),
                deck.name,
                deck.description,
                deck.created_at.timestamp_millis()
            ],
        )?;
        log::info!("Created deck '{}' ({}) for {}", deck.name, deck.id, owner_id);
        Ok(deck)
    }

    /// List the decks owned by a learner, oldest first
    pub fn list_decks(&self, owner_id: Uuid) -> Result<Vec<Deck>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, description, created_at FROM decks
             WHERE owner_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let decks = stmt
            .query_map([owner_id.to_string()], |row| {
                Ok(Deck {
                    id: uuid_column(row, 0)?,
                    owner_id: uuid_column(row, 1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    created_at: timestamp_column(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decks)
    }

    // ==================== Card Operations ====================

    /// Create a new card at the end of a deck with default scheduling state
    pub fn add_card(&self, deck_id: Uuid, front: &str, back: &str) -> Result<Flashcard> {
        let conn = self.lock()?;

        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM decks WHERE id = ?1", [deck_id.to_string()], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::DeckNotFound(deck_id));
        }

        let position: i32 = conn.query_row(
            "SELECT count(*) FROM flashcards WHERE deck_id = ?1",
            [deck_id.to_string()],
            |r| r.get(0),
        )?;

        let mut card = Flashcard::new(deck_id, front.to_string(), back.to_string());
        card.position = position;
        insert_card(&conn, &card)?;

        log::debug!("Added card {} to deck {}", card.id, deck_id);
        Ok(card)
    }

    /// Insert or replace a card row as-is
    pub fn put_card(&self, card: &Flashcard) -> Result<()> {
        insert_card(&*self.lock()?, card)
    }
}

fn insert_card(conn: &Connection, card: &Flashcard) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO flashcards
            (id, deck_id, front, back, repetition_count, interval_days, ease,
             next_review_at, last_reviewed, revision, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            card.id.to_string(),
            card.deck_id.to_string(),
            card.front,
            card.back,
            card.schedule.repetition_count,
            card.schedule.interval_days,
            card.schedule.ease,
            card.next_review_at.map(|t| t.timestamp_millis()),
            card.last_reviewed.map(|t| t.timestamp_millis()),
            revision_to_sql(card.revision),
            card.position,
            card.created_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn select_card(conn: &Connection, card_id: Uuid) -> Result<Option<OwnedCard>> {
    let sql = format!(
        "SELECT {}, d.owner_id FROM flashcards c JOIN decks d ON d.id = c.deck_id WHERE c.id = ?1",
        CARD_COLUMNS
    );
    let owned = conn
        .query_row(&sql, [card_id.to_string()], |row| {
            Ok(OwnedCard {
                card: card_from_row(row)?,
                owner_id: uuid_column(row, 12)?,
            })
        })
        .optional()?;
    Ok(owned)
}

fn card_from_row(row: &Row) -> rusqlite::Result<Flashcard> {
    let revision: i64 = row.get(9)?;
    Ok(Flashcard {
        id: uuid_column(row, 0)?,
        deck_id: uuid_column(row, 1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        schedule: SchedulingState::from_stored(row.get(4)?, row.get(5)?, row.get(6)?),
        next_review_at: optional_timestamp_column(row, 7)?,
        last_reviewed: optional_timestamp_column(row, 8)?,
        revision: u64::try_from(revision)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(9, revision))?,
        position: row.get(10)?,
        created_at: timestamp_column(row, 11)?,
    })
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn optional_timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(millis) => DateTime::from_timestamp_millis(millis)
            .map(Some)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis)),
        None => Ok(None),
    }
}

fn revision_to_sql(revision: u64) -> i64 {
    i64::try_from(revision).unwrap_or(i64::MAX)
}

#[async_trait]
impl CardStore for SqliteCardStore {
    async fn owned_deck_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM decks WHERE owner_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([owner_id.to_string()], |row| uuid_column(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
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

        let placeholders = deck_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let due_clause = if due_at.is_some() {
            "AND (c.next_review_at IS NULL OR c.next_review_at <= ?)"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM flashcards c
             WHERE c.deck_id IN ({}) {}
             ORDER BY c.next_review_at ASC, c.position ASC, c.id ASC",
            CARD_COLUMNS, placeholders, due_clause
        );

        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        for id in deck_ids {
            values.push(Box::new(id.to_string()));
        }
        if let Some(now) = due_at {
            values.push(Box::new(now.timestamp_millis()));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let cards = stmt
            .query_map(params_from_iter(values.iter()), card_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        log::debug!("[DB] {} card(s) in {} deck(s)", cards.len(), deck_ids.len());
        Ok(cards)
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<OwnedCard>> {
        select_card(&*self.lock()?, card_id)
    }

    async fn update_schedule(
        &self,
        card_id: Uuid,
        expected_revision: u64,
        update: &ScheduleUpdate,
    ) -> Result<Flashcard> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE flashcards
             SET repetition_count = ?1, interval_days = ?2, ease = ?3,
                 last_reviewed = ?4, next_review_at = ?5, revision = revision + 1
             WHERE id = ?6 AND revision = ?7",
            params![
                update.schedule.repetition_count,
                update.schedule.interval_days,
                update.schedule.ease,
                update.last_reviewed.timestamp_millis(),
                update.next_review_at.timestamp_millis(),
                card_id.to_string(),
                revision_to_sql(expected_revision),
            ],
        )?;

        if changed == 0 {
            let found: Option<i64> = tx
                .query_row(
                    "SELECT revision FROM flashcards WHERE id = ?1",
                    [card_id.to_string()],
                    |r| r.get(0),
                )
                .optional()?;
            return Err(match found {
                Some(found) => StoreError::Conflict {
                    card_id,
                    expected: expected_revision,
                    found: found as u64,
                },
                None => StoreError::CardNotFound(card_id),
            });
        }

        let stored = select_card(&tx, card_id)?.ok_or(StoreError::CardNotFound(card_id))?;
        tx.commit()?;
        Ok(stored.card)
    }
}
