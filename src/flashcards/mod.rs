//! Flashcard review and spaced repetition for Studyhall
//!
//! This module provides:
//! - SM-2 scheduling of a card after each review
//! - The card store contract, with SQLite and in-memory stores
//! - The review controller (validation, busy flag, persistence)
//! - The per-learner review session state machine

pub mod algorithm;
pub mod controller;
pub mod memory;
pub mod models;
pub mod session;
pub mod sqlite;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{resolve_quality, ReviewController, ReviewError};
pub use memory::MemoryCardStore;
pub use models::*;
pub use session::{ReviewPhase, ReviewSession};
pub use sqlite::SqliteCardStore;
pub use store::{CardStore, OwnedCard, StoreError};
