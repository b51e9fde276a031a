//! Instrumented card store for controller and session tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use super::memory::MemoryCardStore;
use super::models::{Flashcard, ScheduleUpdate};
use super::store::{CardStore, OwnedCard, Result, StoreError};

/// Wraps [`MemoryCardStore`], counting point reads and writes. It can hold
/// writes at a gate, delay reads, stall after a committed write, or fail
/// the next few writes.
pub(crate) struct TestStore {
    pub inner: MemoryCardStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing_writes: AtomicUsize,
    gate: Option<Semaphore>,
    write_entered: Notify,
    read_delay: Option<Duration>,
    ack_delay: Option<Duration>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryCardStore::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
            gate: None,
            write_entered: Notify::new(),
            read_delay: None,
            ack_delay: None,
        }
    }

    /// Every write waits for [`TestStore::release_write`]
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Writes commit, then the reply is held back for `delay`
    pub fn with_write_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = Some(delay);
        self
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn wait_for_write(&self) {
        self.write_entered.notified().await;
    }

    pub fn release_write(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl CardStore for TestStore {
    async fn owned_deck_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>> {
        self.inner.owned_deck_ids(owner_id).await
    }

    async fn cards_in_decks(
        &self,
        deck_ids: &[Uuid],
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Flashcard>> {
        self.inner.cards_in_decks(deck_ids, due_at).await
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<OwnedCard>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_card(card_id).await
    }

    async fn update_schedule(
        &self,
        card_id: Uuid,
        expected_revision: u64,
        update: &ScheduleUpdate,
    ) -> Result<Flashcard> {
        self.write_entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
                .forget();
        }

        let failing = self.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_writes.store(failing - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        let updated = self.inner.update_schedule(card_id, expected_revision, update).await?;
        if let Some(delay) = self.ack_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(updated)
    }
}
