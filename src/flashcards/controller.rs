//! Review controller
//!
//! Validates a learner's rating, runs the scheduler and writes the result
//! back through the [`CardStore`]. Each submission is exactly one read
//! followed by one conditional write.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::algorithm::{apply_review, next_state, preview_intervals};
use super::models::{DeckScope, DueQuery, Flashcard, IntervalPreview, Quality, ReviewLabel};
use super::store::{CardStore, OwnedCard, StoreError};
use crate::auth::{AuthError, Learner};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Invalid quality (0..5) or result label required")]
    InvalidQuality,

    #[error("Flashcard not found: {0}")]
    CardNotFound(Uuid),

    #[error("Flashcard {0} belongs to a deck you do not own")]
    Forbidden(Uuid),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    #[error("A review for flashcard {0} is already in progress")]
    Busy(Uuid),

    #[error("Flashcard {0} has a corrupt schedule")]
    InvalidSchedule(Uuid),

    #[error("Reveal the answer before rating the card")]
    NotRevealed,

    #[error("The review session is over")]
    SessionFinished,

    #[error("No failed review to retry")]
    NothingToRetry,

    #[error("Failed to update flashcard: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CardNotFound(id) => ReviewError::CardNotFound(id),
            other => ReviewError::Store(other),
        }
    }
}

impl ReviewError {
    /// Whether the same submission may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            ReviewError::Store(err) => err.is_retryable(),
            ReviewError::Busy(_) => true,
            _ => false,
        }
    }

    /// HTTP-style status for the presentation layer
    pub fn status(&self) -> u16 {
        match self {
            ReviewError::InvalidQuality => 400,
            ReviewError::Unauthenticated(_) => 401,
            ReviewError::Forbidden(_) => 403,
            ReviewError::CardNotFound(_) => 404,
            ReviewError::Busy(_)
            | ReviewError::NotRevealed
            | ReviewError::SessionFinished
            | ReviewError::NothingToRetry => 409,
            ReviewError::Store(StoreError::Conflict { .. }) => 409,
            ReviewError::Store(err) if err.is_retryable() => 503,
            ReviewError::Store(_) | ReviewError::InvalidSchedule(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;

/// Turn a numeric quality and/or a coarse label into a validated quality.
///
/// An in-range number wins; otherwise a recognised label is used.
pub fn resolve_quality(quality: Option<i64>, label: Option<&str>) -> Result<Quality> {
    if let Some(valid) = quality.and_then(Quality::new) {
        return Ok(valid);
    }

    label
        .and_then(|l| l.parse::<ReviewLabel>().ok())
        .map(ReviewLabel::quality)
        .ok_or(ReviewError::InvalidQuality)
}

/// Cards with a submission in progress
type InFlight = Arc<Mutex<HashSet<Uuid>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, HashSet<Uuid>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a card busy until dropped
struct InFlightGuard {
    in_flight: InFlight,
    card_id: Uuid,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, card_id: Uuid) -> Result<Self> {
        if !lock_in_flight(in_flight).insert(card_id) {
            return Err(ReviewError::Busy(card_id));
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            card_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.card_id);
    }
}

async fn timed<T>(
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, StoreError>>,
) -> std::result::Result<T, StoreError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Unavailable(format!("card store timed out after {:?}", limit)))?
}

/// Drives due-card retrieval and review submission for any [`CardStore`]
pub struct ReviewController<S: ?Sized> {
    store: Arc<S>,
    in_flight: InFlight,
    store_timeout: Duration,
}

impl<S: ?Sized> Clone for ReviewController<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            store_timeout: self.store_timeout,
        }
    }
}

impl<S: CardStore + ?Sized + 'static> ReviewController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            in_flight: Arc::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether a submission for `card_id` is still running
    pub fn is_busy(&self, card_id: Uuid) -> bool {
        lock_in_flight(&self.in_flight).contains(&card_id)
    }

    /// Snapshot of the cards the learner should review now.
    ///
    /// An explicit deck filter is narrowed to the learner's own decks. No
    /// owned decks means an empty queue, not an error.
    pub async fn load_due_queue(&self, learner: &Learner, query: &DueQuery) -> Result<Vec<Flashcard>> {
        let owned = timed(self.store_timeout, self.store.owned_deck_ids(learner.id)).await?;

        let deck_ids: Vec<Uuid> = match &query.scope {
            DeckScope::Owned => owned,
            DeckScope::Decks(filter) => {
                let allowed: Vec<Uuid> = filter.iter().copied().filter(|id| owned.contains(id)).collect();
                if allowed.len() != filter.len() {
                    log::warn!(
                        "Ignoring {} deck(s) not owned by learner {}",
                        filter.len() - allowed.len(),
                        learner.id
                    );
                }
                allowed
            }
        };

        if deck_ids.is_empty() {
            log::debug!("Learner {} has no decks in scope", learner.id);
            return Ok(Vec::new());
        }

        let due_at = query.due_only.then(Utc::now);
        let cards = timed(self.store_timeout, self.store.cards_in_decks(&deck_ids, due_at)).await?;
        log::info!(
            "Loaded {} card(s) for learner {} across {} deck(s)",
            cards.len(),
            learner.id,
            deck_ids.len()
        );
        Ok(cards)
    }

    /// Record one review and return the card as stored afterwards.
    ///
    /// The read-compute-write runs on its own task, so dropping the returned
    /// future does not cancel a write that is already under way. A second
    /// submission for the same card fails with [`ReviewError::Busy`] until
    /// the first one settles.
    pub async fn submit_review(&self, learner: &Learner, card_id: Uuid, quality: Quality) -> Result<Flashcard> {
        self.spawn_review(learner, card_id, quality, None).await
    }

    /// Record one review against the card as the caller last saw it.
    ///
    /// The write only goes through if the stored revision still matches
    /// `basis`. If the store already holds exactly this review on top of
    /// `basis` (an earlier attempt committed but its reply was lost), that
    /// card is returned and nothing is written.
    pub async fn submit_review_from(&self, learner: &Learner, basis: &Flashcard, quality: Quality) -> Result<Flashcard> {
        self.spawn_review(learner, basis.id, quality, Some(basis.clone())).await
    }

    async fn spawn_review(
        &self,
        learner: &Learner,
        card_id: Uuid,
        quality: Quality,
        basis: Option<Flashcard>,
    ) -> Result<Flashcard> {
        let guard = InFlightGuard::acquire(&self.in_flight, card_id)?;

        let store = Arc::clone(&self.store);
        let learner_id = learner.id;
        let limit = self.store_timeout;

        let task = tokio::spawn(async move {
            let _guard = guard;
            persist_review(&*store, learner_id, card_id, quality, basis, limit).await
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                log::error!("Review task for card {} failed: {}", card_id, join_err);
                Err(ReviewError::Store(StoreError::Unavailable(format!(
                    "review task failed: {}",
                    join_err
                ))))
            }
        }
    }

    /// Validate raw input and submit it
    pub async fn submit_input(
        &self,
        learner: &Learner,
        card_id: Uuid,
        quality: Option<i64>,
        label: Option<&str>,
    ) -> Result<Flashcard> {
        let quality = resolve_quality(quality, label).map_err(|e| {
            log::warn!("Rejected review for card {}: quality {:?}, label {:?}", card_id, quality, label);
            e
        })?;
        self.submit_review(learner, card_id, quality).await
    }

    /// Current stored state of a card the learner owns
    pub async fn card(&self, learner: &Learner, card_id: Uuid) -> Result<Flashcard> {
        let owned = fetch_owned(&*self.store, learner.id, card_id, self.store_timeout).await?;
        Ok(owned.card)
    }

    /// Interval each review button would give the card right now
    pub async fn preview(&self, learner: &Learner, card_id: Uuid) -> Result<IntervalPreview> {
        let card = self.card(learner, card_id).await?;
        check_schedule(&card)?;
        Ok(preview_intervals(&card.schedule))
    }
}

fn check_schedule(card: &Flashcard) -> Result<()> {
    if card.schedule.is_valid() {
        return Ok(());
    }
    log::error!("Card {} has an out-of-domain schedule: {:?}", card.id, card.schedule);
    Err(ReviewError::InvalidSchedule(card.id))
}

/// Whether `current` is `basis` with this very review applied on top
fn review_already_stored(basis: &Flashcard, current: &Flashcard, quality: Quality) -> bool {
    if !basis.schedule.is_valid() || current.revision != basis.revision + 1 {
        return false;
    }
    let reviewed_after_basis = match (basis.last_reviewed, current.last_reviewed) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(before), Some(after)) => after > before,
    };
    reviewed_after_basis && current.schedule == next_state(&basis.schedule, quality)
}

async fn fetch_owned<S: CardStore + ?Sized>(
    store: &S,
    learner_id: Uuid,
    card_id: Uuid,
    limit: Duration,
) -> Result<OwnedCard> {
    let owned = timed(limit, store.get_card(card_id))
        .await?
        .ok_or(ReviewError::CardNotFound(card_id))?;

    if owned.owner_id != learner_id {
        log::warn!("Learner {} tried to access card {} they do not own", learner_id, card_id);
        return Err(ReviewError::Forbidden(card_id));
    }
    Ok(owned)
}

async fn persist_review<S: CardStore + ?Sized>(
    store: &S,
    learner_id: Uuid,
    card_id: Uuid,
    quality: Quality,
    basis: Option<Flashcard>,
    limit: Duration,
) -> Result<Flashcard> {
    let OwnedCard { card, .. } = fetch_owned(store, learner_id, card_id, limit).await?;
    check_schedule(&card)?;

    if let Some(basis) = basis.filter(|b| b.revision != card.revision) {
        if review_already_stored(&basis, &card, quality) {
            log::info!(
                "Review of card {} (q={}) already stored at revision {}",
                card_id,
                quality,
                card.revision
            );
            return Ok(card);
        }
        log::warn!(
            "Card {} changed since it was shown: revision {} -> {}",
            card_id,
            basis.revision,
            card.revision
        );
        return Err(ReviewError::Store(StoreError::Conflict {
            card_id,
            expected: basis.revision,
            found: card.revision,
        }));
    }

    let before = card.schedule;
    let update = apply_review(&before, quality, Utc::now());
    let updated = timed(limit, store.update_schedule(card_id, card.revision, &update))
        .await
        .map_err(|e| {
            log::error!("Failed to persist review for card {}: {}", card_id, e);
            e
        })?;

    log::info!(
        "[SM-2 Result] Card {} (q={}): reps {} -> {}, interval {}d -> {}d, ease {:.2} -> {:.2}",
        card_id,
        quality,
        before.repetition_count,
        updated.schedule.repetition_count,
        before.interval_days,
        updated.schedule.interval_days,
        before.ease,
        updated.schedule.ease
    );
    Ok(updated)
}
