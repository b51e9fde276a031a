//! Review session state machine
//!
//! One learner works through a snapshot of due cards, one card at a time:
//!
//! ```text
//! start ──► Presenting ──reveal──► Revealed ──submit──► Submitting
//!   │           ▲                     ▲                    │
//!   │           └──────── ok, more ───┼────────────────────┤
//!   │                                 └────── error ───────┤
//!   └──────────────► Finished ◄──────────── ok, last ──────┘
//! ```
//!
//! A failed submission keeps the chosen quality, together with the card as
//! it was shown, so [`ReviewSession::retry`] can resend it. A retry whose
//! first attempt did reach the store is recognised and not applied twice. Dropping a `submit` future mid-flight abandons the
//! session; the write itself still completes in the background.

use serde::Serialize;
use uuid::Uuid;

use super::controller::{resolve_quality, Result, ReviewController, ReviewError};
use super::models::{DueQuery, Flashcard, Quality};
use super::store::{CardStore, StoreError};
use crate::auth::Learner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewPhase {
    /// Front of the current card is shown
    Presenting,
    /// Back is shown, waiting for a rating
    Revealed,
    /// Rating is being persisted
    Submitting,
    /// No due cards remain
    Finished,
    /// Closed by the learner
    Abandoned,
}

/// A rating and the card state it was given against
#[derive(Debug, Clone)]
struct PendingReview {
    quality: Quality,
    basis: Flashcard,
}

pub struct ReviewSession<S: CardStore + ?Sized + 'static> {
    controller: ReviewController<S>,
    learner: Learner,
    queue: Vec<Flashcard>,
    index: usize,
    phase: ReviewPhase,
    pending: Option<PendingReview>,
    last_error: Option<String>,
    reviewed: usize,
}

impl<S: CardStore + ?Sized + 'static> ReviewSession<S> {
    /// Fetch the due queue and open the session on its first card
    pub async fn start(controller: ReviewController<S>, learner: Learner, query: &DueQuery) -> Result<Self> {
        let queue = controller.load_due_queue(&learner, query).await?;
        let phase = if queue.is_empty() {
            ReviewPhase::Finished
        } else {
            ReviewPhase::Presenting
        };
        log::info!("Review session for {} opened with {} card(s)", learner.id, queue.len());

        Ok(Self {
            controller,
            learner,
            queue,
            index: 0,
            phase,
            pending: None,
            last_error: None,
            reviewed: 0,
        })
    }

    pub fn phase(&self) -> ReviewPhase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, ReviewPhase::Finished | ReviewPhase::Abandoned)
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    /// The session's snapshot, with reviewed cards replaced by their stored state
    pub fn queue(&self) -> &[Flashcard] {
        &self.queue
    }

    /// Card under review, if any
    pub fn current(&self) -> Option<&Flashcard> {
        if self.is_over() {
            return None;
        }
        self.queue.get(self.index)
    }

    /// 1-based position of the current card and the queue length
    pub fn progress(&self) -> (usize, usize) {
        ((self.index + 1).min(self.queue.len()), self.queue.len())
    }

    pub fn reviewed(&self) -> usize {
        self.reviewed
    }

    /// Quality kept from a failed submission
    pub fn pending_quality(&self) -> Option<Quality> {
        self.pending.as_ref().map(|p| p.quality)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.phase == ReviewPhase::Submitting {
            log::warn!("Review session for {} abandoned mid-submission", self.learner.id);
            self.phase = ReviewPhase::Abandoned;
        }
        if self.is_over() {
            return Err(ReviewError::SessionFinished);
        }
        Ok(())
    }

    /// Show the back of the current card
    pub fn reveal(&mut self) -> Result<&Flashcard> {
        self.ensure_open()?;
        self.phase = ReviewPhase::Revealed;
        self.current().ok_or(ReviewError::SessionFinished)
    }

    /// Rate the revealed card, persist it and move on
    pub async fn submit(&mut self, quality: Quality) -> Result<Flashcard> {
        self.ensure_open()?;
        if self.phase != ReviewPhase::Revealed {
            return Err(ReviewError::NotRevealed);
        }

        let basis = self.queue[self.index].clone();
        self.send(PendingReview { quality, basis }).await
    }

    async fn send(&mut self, pending: PendingReview) -> Result<Flashcard> {
        let card_id = pending.basis.id;
        self.pending = Some(pending.clone());
        self.phase = ReviewPhase::Submitting;

        match self
            .controller
            .submit_review_from(&self.learner, &pending.basis, pending.quality)
            .await
        {
            Ok(updated) => {
                self.queue[self.index] = updated.clone();
                self.reviewed += 1;
                self.pending = None;
                self.last_error = None;
                self.advance();
                Ok(updated)
            }
            Err(err) => {
                log::warn!("Review of card {} failed: {}", card_id, err);
                if matches!(err, ReviewError::Store(StoreError::Conflict { .. })) {
                    self.refresh_basis(card_id).await;
                }
                self.phase = ReviewPhase::Revealed;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Validate raw input first; a bad rating leaves the card revealed
    pub async fn submit_input(&mut self, quality: Option<i64>, label: Option<&str>) -> Result<Flashcard> {
        self.ensure_open()?;
        if self.phase != ReviewPhase::Revealed {
            return Err(ReviewError::NotRevealed);
        }
        match resolve_quality(quality, label) {
            Ok(quality) => self.submit(quality).await,
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Resend the quality of the last failed submission
    pub async fn retry(&mut self) -> Result<Flashcard> {
        self.ensure_open()?;
        let pending = self.pending.clone().ok_or(ReviewError::NothingToRetry)?;
        if self.phase != ReviewPhase::Revealed {
            return Err(ReviewError::NotRevealed);
        }
        self.send(pending).await
    }

    /// Card changed elsewhere; the pending rating now applies to its latest state
    async fn refresh_basis(&mut self, card_id: Uuid) {
        match self.controller.card(&self.learner, card_id).await {
            Ok(fresh) => {
                self.queue[self.index] = fresh.clone();
                if let Some(pending) = self.pending.as_mut() {
                    pending.basis = fresh;
                }
            }
            Err(err) => log::warn!("Could not reload card {}: {}", card_id, err),
        }
    }

    /// Move past the current card without rating it
    pub fn skip(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.pending = None;
        self.last_error = None;
        self.advance();
        Ok(())
    }

    /// Close the session; nothing pending is written
    pub fn abandon(&mut self) {
        if !self.is_over() {
            log::info!(
                "Review session for {} abandoned after {} review(s)",
                self.learner.id,
                self.reviewed
            );
            self.phase = ReviewPhase::Abandoned;
        }
    }

    fn advance(&mut self) {
        self.index += 1;
        if self.index < self.queue.len() {
            self.phase = ReviewPhase::Presenting;
        } else {
            log::info!(
                "Review session for {} finished: {} review(s)",
                self.learner.id,
                self.reviewed
            );
            self.phase = ReviewPhase::Finished;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::flashcards::memory::MemoryCardStore;
    use crate::flashcards::testing::TestStore;
    use chrono::{Duration, Utc};

    fn q(value: i64) -> Quality {
        Quality::new(value).unwrap()
    }

    async fn session_with_cards(count: usize) -> (Arc<TestStore>, ReviewSession<TestStore>) {
        let store = Arc::new(TestStore::new());
        let learner = Learner::new(Uuid::new_v4(), "ada");
        let deck = store.inner.create_deck(learner.id, "Deck").unwrap();
        for i in 0..count {
            store.inner.add_card(deck.id, &format!("Q{}", i), &format!("A{}", i)).unwrap();
        }
        let controller = ReviewController::new(Arc::clone(&store));
        let session = ReviewSession::start(controller, learner, &DueQuery::default())
            .await
            .unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn test_empty_queue_finishes_immediately() {
        let (_store, mut session) = session_with_cards(0).await;
        assert_eq!(session.phase(), ReviewPhase::Finished);
        assert!(session.current().is_none());
        assert!(matches!(session.reveal(), Err(ReviewError::SessionFinished)));
    }

    #[tokio::test]
    async fn test_walks_queue_in_order() {
        let (_store, mut session) = session_with_cards(2).await;
        let order: Vec<Uuid> = session.queue().iter().map(|c| c.id).collect();

        assert_eq!(session.phase(), ReviewPhase::Presenting);
        assert_eq!(session.progress(), (1, 2));
        let first = session.current().unwrap().id;
        assert_eq!(first, order[0]);

        let back = session.reveal().unwrap().back.clone();
        assert_eq!(back, "A0");
        assert_eq!(session.phase(), ReviewPhase::Revealed);

        let updated = session.submit(q(5)).await.unwrap();
        assert_eq!(updated.id, first);
        assert_eq!(updated.schedule.repetition_count, 1);
        assert_eq!(session.phase(), ReviewPhase::Presenting);
        assert_eq!(session.current().unwrap().id, order[1]);

        session.reveal().unwrap();
        session.submit_input(None, Some("again")).await.unwrap();
        assert_eq!(session.phase(), ReviewPhase::Finished);
        assert_eq!(session.reviewed(), 2);
        assert_eq!(session.queue()[0].revision, 1);
    }

    #[tokio::test]
    async fn test_submit_requires_reveal() {
        let (store, mut session) = session_with_cards(1).await;
        let result = session.submit(q(4)).await;
        assert!(matches!(result, Err(ReviewError::NotRevealed)));
        assert_eq!(session.phase(), ReviewPhase::Presenting);
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_invalid_quality_stays_revealed() {
        let (store, mut session) = session_with_cards(1).await;
        session.reveal().unwrap();

        let result = session.submit_input(Some(6), None).await;
        assert!(matches!(result, Err(ReviewError::InvalidQuality)));
        assert_eq!(session.phase(), ReviewPhase::Revealed);
        assert!(session.pending_quality().is_none());
        assert!(session.last_error().is_some());
        assert_eq!(store.reads(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_pending_quality() {
        let (store, mut session) = session_with_cards(1).await;
        store.fail_next_writes(1);
        session.reveal().unwrap();

        let failed = session.submit(q(4)).await;
        assert!(matches!(failed, Err(ReviewError::Store(StoreError::Unavailable(_)))));
        assert_eq!(session.phase(), ReviewPhase::Revealed);
        assert_eq!(session.pending_quality(), Some(q(4)));

        let updated = session.retry().await.unwrap();
        assert_eq!(updated.schedule.repetition_count, 1);
        assert_eq!(updated.revision, 1);
        assert_eq!(session.phase(), ReviewPhase::Finished);
        assert!(session.pending_quality().is_none());
    }

    #[tokio::test]
    async fn test_retry_without_pending() {
        let (_store, mut session) = session_with_cards(1).await;
        session.reveal().unwrap();
        let err = session.retry().await.unwrap_err();
        assert!(matches!(err, ReviewError::NothingToRetry));
        assert_eq!(err.status(), 409);
        assert_eq!(session.phase(), ReviewPhase::Revealed);
    }

    #[tokio::test]
    async fn test_retry_after_lost_reply_applies_once() {
        let store = Arc::new(TestStore::new().with_write_ack_delay(std::time::Duration::from_millis(300)));
        let learner = Learner::new(Uuid::new_v4(), "ada");
        let deck = store.inner.create_deck(learner.id, "Deck").unwrap();
        let card = store.inner.add_card(deck.id, "Q", "A").unwrap();
        let controller = ReviewController::new(Arc::clone(&store))
            .with_timeout(std::time::Duration::from_millis(50));
        let mut session = ReviewSession::start(controller, learner, &DueQuery::default())
            .await
            .unwrap();

        session.reveal().unwrap();
        let timed_out = session.submit(q(5)).await.unwrap_err();
        assert!(matches!(timed_out, ReviewError::Store(StoreError::Unavailable(_))));
        assert_eq!(session.pending_quality(), Some(q(5)));

        // The write committed even though its reply never arrived
        let stored = store.inner.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.card.revision, 1);

        let updated = session.retry().await.unwrap();
        assert_eq!(updated.schedule.repetition_count, 1);
        assert_eq!(updated.schedule.interval_days, 1);
        assert_eq!(updated.revision, 1);
        assert_eq!(store.writes(), 1);
        assert_eq!(session.reviewed(), 1);
        assert_eq!(session.phase(), ReviewPhase::Finished);
        assert!(session.pending_quality().is_none());
    }

    #[tokio::test]
    async fn test_conflict_reloads_card_for_retry() {
        let (store, mut session) = session_with_cards(1).await;
        let card_id = session.current().unwrap().id;

        // Reviewed on another device after the queue was loaded
        let mut elsewhere = store.inner.get_card(card_id).await.unwrap().unwrap().card;
        elsewhere.schedule.repetition_count = 1;
        elsewhere.revision = 1;
        elsewhere.last_reviewed = Some(Utc::now());
        store.inner.put_card(elsewhere).unwrap();

        session.reveal().unwrap();
        let conflict = session.submit(q(5)).await.unwrap_err();
        assert!(matches!(conflict, ReviewError::Store(StoreError::Conflict { .. })));
        assert_eq!(session.phase(), ReviewPhase::Revealed);
        assert_eq!(session.current().unwrap().revision, 1);
        assert_eq!(store.writes(), 0);

        let updated = session.retry().await.unwrap();
        assert_eq!(updated.schedule.repetition_count, 2);
        assert_eq!(updated.schedule.interval_days, 6);
        assert_eq!(updated.revision, 2);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_skip_and_abandon() {
        let (store, mut session) = session_with_cards(3).await;
        session.skip().unwrap();
        assert_eq!(session.progress(), (2, 3));

        session.abandon();
        assert_eq!(session.phase(), ReviewPhase::Abandoned);
        assert!(session.current().is_none());
        assert!(matches!(session.skip(), Err(ReviewError::SessionFinished)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_due_date_moves_forward() {
        let store = Arc::new(MemoryCardStore::new());
        let learner = Learner::new(Uuid::new_v4(), "ada");
        let deck = store.create_deck(learner.id, "Deck").unwrap();
        let mut card = store.add_card(deck.id, "Q", "A").unwrap();
        card.schedule.repetition_count = 2;
        card.schedule.interval_days = 6;
        card.schedule.ease = 2.6;
        card.next_review_at = Some(Utc::now() - Duration::days(1));
        store.put_card(card).unwrap();

        let controller = ReviewController::new(Arc::clone(&store));
        let mut session = ReviewSession::start(controller.clone(), learner.clone(), &DueQuery::default())
            .await
            .unwrap();
        session.reveal().unwrap();
        let updated = session.submit(q(5)).await.unwrap();

        assert_eq!(updated.schedule.interval_days, 16);
        let reviewed = updated.last_reviewed.unwrap();
        assert_eq!(updated.next_review_at.unwrap() - reviewed, Duration::days(16));

        let requeued = controller.load_due_queue(&learner, &DueQuery::default()).await.unwrap();
        assert!(requeued.is_empty());
    }
}
