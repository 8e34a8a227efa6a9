use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use publisher_chain_client_interface::TxHash;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{StateStore, StoreError};
use crate::types::announcement::Announcement;
use crate::types::batch::{AppendOutcome, BatchMetadata, LockOutcome, PartitionBatchState};
use crate::types::queue::QueueType;
use crate::types::transaction::PendingTransaction;

#[derive(Default)]
struct MemoryState {
    batches: HashMap<QueueType, PartitionBatchState>,
    pending: BTreeMap<(TxHash, String), PendingTransaction>,
    epoch_usage: HashMap<u32, (u128, Instant)>,
    last_scanned_block: Option<u32>,
}

/// Single process [`StateStore`]. Every operation runs under one lock.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the batch state of `queue`
    pub async fn batch_state(&self, queue: QueueType) -> PartitionBatchState {
        self.state.lock().await.batches.get(&queue).cloned().unwrap_or_default()
    }

    pub async fn replace_batch_state(&self, queue: QueueType, batch_state: PartitionBatchState) {
        self.state.lock().await.batches.insert(queue, batch_state);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn add_to_batch(
        &self,
        queue: QueueType,
        candidate: BatchMetadata,
        job_id: &str,
        announcement: &Announcement,
    ) -> Result<AppendOutcome, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.batches.entry(queue).or_default().append(candidate, job_id, announcement))
    }

    async fn lock_batch(
        &self,
        queue: QueueType,
        now: DateTime<Utc>,
        lock_duration: chrono::Duration,
    ) -> Result<LockOutcome, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.batches.entry(queue).or_default().lock(now, lock_duration))
    }

    async fn release_locked_batch(&self, queue: QueueType, batch_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.batches.get_mut(&queue).is_some_and(|batch_state| batch_state.release(batch_id)))
    }

    async fn get_open_batch_metadata(&self, queue: QueueType) -> Result<Option<BatchMetadata>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.batches.get(&queue).and_then(|batch_state| batch_state.open.as_ref()).map(|open| open.metadata.clone()))
    }

    async fn add_pending_transaction(&self, transaction: &PendingTransaction) -> Result<(), StoreError> {
        let key = (transaction.tx_hash.clone(), transaction.reference_job.id.clone());
        self.state.lock().await.pending.insert(key, transaction.clone());
        Ok(())
    }

    async fn get_pending_transactions(&self) -> Result<Vec<PendingTransaction>, StoreError> {
        Ok(self.state.lock().await.pending.values().cloned().collect())
    }

    async fn get_pending_transaction_for_job(&self, job_id: &str) -> Result<Option<PendingTransaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.pending.values().find(|transaction| transaction.reference_job.id == job_id).cloned())
    }

    async fn remove_pending_transactions(&self, tx_hashes: &[TxHash]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|(tx_hash, _), _| !tx_hashes.contains(tx_hash));
        Ok((before - state.pending.len()) as u64)
    }

    async fn increment_epoch_usage(&self, epoch: u32, amount: u128, ttl: Duration) -> Result<u128, StoreError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let entry = state.epoch_usage.entry(epoch).or_insert((0, now));
        if entry.1 <= now {
            entry.0 = 0;
        }
        entry.0 = entry.0.saturating_add(amount);
        entry.1 = now + ttl;
        Ok(entry.0)
    }

    async fn get_epoch_usage(&self, epoch: u32) -> Result<u128, StoreError> {
        let state = self.state.lock().await;
        Ok(match state.epoch_usage.get(&epoch) {
            Some((used, expires_at)) if *expires_at > Instant::now() => *used,
            _ => 0,
        })
    }

    async fn get_last_scanned_block(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.state.lock().await.last_scanned_block)
    }

    async fn set_last_scanned_block(&self, block_number: u32) -> Result<(), StoreError> {
        self.state.lock().await.last_scanned_block = Some(block_number);
        Ok(())
    }
}
