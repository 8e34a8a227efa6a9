pub mod error;
pub mod memory;
pub mod mongodb;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use error::StoreError;
use publisher_chain_client_interface::TxHash;
use uuid::Uuid;

use crate::types::announcement::Announcement;
use crate::types::batch::{AppendOutcome, BatchMetadata, LockOutcome};
use crate::types::queue::QueueType;
use crate::types::transaction::PendingTransaction;

/// Durable state shared by every publisher instance.
///
/// Each method is a single atomic operation against the backend. Callers never
/// read-modify-write through separate calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// add_to_batch - Append a record to the open batch of `queue`, opening it from `candidate` if none exists
    async fn add_to_batch(
        &self,
        queue: QueueType,
        candidate: BatchMetadata,
        job_id: &str,
        announcement: &Announcement,
    ) -> Result<AppendOutcome, StoreError>;
    /// lock_batch - Move the open batch of `queue` into the locked slot, or report why it can't be
    async fn lock_batch(
        &self,
        queue: QueueType,
        now: DateTime<Utc>,
        lock_duration: chrono::Duration,
    ) -> Result<LockOutcome, StoreError>;
    /// release_locked_batch - Delete the locked batch if it still is `batch_id`
    async fn release_locked_batch(&self, queue: QueueType, batch_id: Uuid) -> Result<bool, StoreError>;
    async fn get_open_batch_metadata(&self, queue: QueueType) -> Result<Option<BatchMetadata>, StoreError>;

    /// add_pending_transaction - Watch `transaction`. Jobs coalesced into one submission get one entry each.
    async fn add_pending_transaction(&self, transaction: &PendingTransaction) -> Result<(), StoreError>;
    async fn get_pending_transactions(&self) -> Result<Vec<PendingTransaction>, StoreError>;
    /// get_pending_transaction_for_job - Watch-list entry of the job `job_id`, if it is watched
    async fn get_pending_transaction_for_job(&self, job_id: &str) -> Result<Option<PendingTransaction>, StoreError>;
    /// remove_pending_transactions - Remove every entry of the given transactions in one operation, returns the removed count
    async fn remove_pending_transactions(&self, tx_hashes: &[TxHash]) -> Result<u64, StoreError>;

    /// increment_epoch_usage - Add `amount` to the usage counter of `epoch` and refresh its expiry
    async fn increment_epoch_usage(&self, epoch: u32, amount: u128, ttl: Duration) -> Result<u128, StoreError>;
    /// get_epoch_usage - Usage of `epoch`, zero once the counter expired
    async fn get_epoch_usage(&self, epoch: u32) -> Result<u128, StoreError>;

    async fn get_last_scanned_block(&self) -> Result<Option<u32>, StoreError>;
    async fn set_last_scanned_block(&self, block_number: u32) -> Result<(), StoreError>;
}
