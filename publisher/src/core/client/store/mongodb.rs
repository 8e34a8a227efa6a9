use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::bson::{self, doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use publisher_chain_client_interface::TxHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{StateStore, StoreError};
use crate::config::types::store::MongoConfig;
use crate::types::announcement::Announcement;
use crate::types::batch::{AppendOutcome, BatchMetadata, LockOutcome, PartitionBatchState};
use crate::types::queue::QueueType;
use crate::types::transaction::PendingTransaction;

const BATCH_STATE_COLLECTION: &str = "batch_state";
const PENDING_TRANSACTIONS_COLLECTION: &str = "pending_transactions";
const EPOCH_USAGE_COLLECTION: &str = "epoch_usage";
const SCANNER_STATE_COLLECTION: &str = "scanner_state";
const LAST_SCANNED_BLOCK_ID: &str = "last_scanned_block";

/// Attempts of one compare-and-swap before giving up under contention
const MAX_CAS_ATTEMPTS: u32 = 16;
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Document guarded by an optimistic `version` field
#[derive(Debug, Serialize, Deserialize)]
struct VersionedDocument<T> {
    #[serde(rename = "_id")]
    id: String,
    version: i64,
    value: T,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EpochUsage {
    /// u128 amounts do not fit any BSON number type
    used: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    expires_at: DateTime<Utc>,
}

impl EpochUsage {
    fn used(&self, key: &str) -> Result<u128, StoreError> {
        if self.used.is_empty() {
            return Ok(0);
        }
        self.used
            .parse()
            .map_err(|e| StoreError::InvalidValue { key: key.to_string(), message: format!("{}", e) })
    }
}

pub(crate) fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn decode_pending_transaction(document: &Document) -> Result<PendingTransaction, StoreError> {
    let transaction = document.get_document("transaction").map_err(|e| StoreError::InvalidValue {
        key: PENDING_TRANSACTIONS_COLLECTION.to_string(),
        message: e.to_string(),
    })?;
    Ok(bson::from_document(transaction.clone())?)
}

fn epoch_key(epoch: u32) -> String {
    format!("epoch:{}", epoch)
}

/// MongoDB backed [`StateStore`].
///
/// Batch state and epoch counters are single documents updated through a versioned
/// compare-and-swap, so several publisher instances can share one database.
pub struct MongoStateStore {
    client: Client,
    database: Database,
}

impl MongoStateStore {
    pub async fn new(config: &MongoConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.connection_uri).await?;
        let database = client.database(&config.database_name);
        Ok(Self { client, database })
    }

    /// Mongodb client uses Arc internally, reducing the cost of clone.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Creates the TTL index that expires epoch usage counters
    pub async fn setup_indexes(&self) -> Result<(), StoreError> {
        let ttl_index = IndexModel::builder()
            .keys(doc! { "value.expires_at": 1 })
            .options(IndexOptions::builder().expire_after(Duration::from_secs(0)).build())
            .build();
        self.collection(EPOCH_USAGE_COLLECTION).create_index(ttl_index, None).await?;
        debug!("Epoch usage TTL index ensured");

        let tx_hash_index = IndexModel::builder().keys(doc! { "tx_hash": 1 }).build();
        self.collection(PENDING_TRANSACTIONS_COLLECTION).create_index(tx_hash_index, None).await?;
        let job_index = IndexModel::builder().keys(doc! { "transaction.reference_job.id": 1 }).build();
        self.collection(PENDING_TRANSACTIONS_COLLECTION).create_index(job_index, None).await?;
        debug!("Pending transaction index ensured");
        Ok(())
    }

    /// Applies `transition` to the document `id` with optimistic concurrency.
    /// The transition is re-run on a fresh read whenever another writer won the race.
    async fn compare_and_swap<T, R, F>(&self, collection_name: &str, id: &str, mut transition: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut(&mut T) -> R + Send,
    {
        let collection = self.collection(collection_name);
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            match collection.find_one(doc! { "_id": id }, None).await? {
                None => {
                    let mut value = T::default();
                    let result = transition(&mut value);
                    let document = bson::to_document(&VersionedDocument { id: id.to_string(), version: 1, value })?;
                    match collection.insert_one(document, None).await {
                        Ok(_) => return Ok(result),
                        Err(e) if is_duplicate_key(&e) => {
                            debug!(key = %id, attempt, "Document created concurrently, retrying");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(document) => {
                    let mut current: VersionedDocument<T> = bson::from_document(document)?;
                    let result = transition(&mut current.value);
                    let value = bson::to_bson(&current.value)?;
                    let updated = collection
                        .update_one(
                            doc! { "_id": id, "version": current.version },
                            doc! { "$set": { "value": value, "version": current.version + 1 } },
                            None,
                        )
                        .await?;
                    if updated.matched_count == 1 {
                        return Ok(result);
                    }
                    debug!(key = %id, attempt, "Version moved during update, retrying");
                }
            }
        }
        warn!(key = %id, attempts = MAX_CAS_ATTEMPTS, "Compare-and-swap did not settle");
        Err(StoreError::ContentionExhausted { key: id.to_string(), attempts: MAX_CAS_ATTEMPTS })
    }

    async fn read_versioned<T: DeserializeOwned>(&self, collection_name: &str, id: &str) -> Result<Option<T>, StoreError> {
        let document = self.collection(collection_name).find_one(doc! { "_id": id }, None).await?;
        Ok(match document {
            Some(document) => Some(bson::from_document::<VersionedDocument<T>>(document)?.value),
            None => None,
        })
    }
}

#[async_trait]
impl StateStore for MongoStateStore {
    async fn add_to_batch(
        &self,
        queue: QueueType,
        candidate: BatchMetadata,
        job_id: &str,
        announcement: &Announcement,
    ) -> Result<AppendOutcome, StoreError> {
        self.compare_and_swap(BATCH_STATE_COLLECTION, &queue.to_string(), |state: &mut PartitionBatchState| {
            state.append(candidate.clone(), job_id, announcement)
        })
        .await
    }

    async fn lock_batch(
        &self,
        queue: QueueType,
        now: DateTime<Utc>,
        lock_duration: chrono::Duration,
    ) -> Result<LockOutcome, StoreError> {
        self.compare_and_swap(BATCH_STATE_COLLECTION, &queue.to_string(), |state: &mut PartitionBatchState| {
            state.lock(now, lock_duration)
        })
        .await
    }

    async fn release_locked_batch(&self, queue: QueueType, batch_id: Uuid) -> Result<bool, StoreError> {
        self.compare_and_swap(BATCH_STATE_COLLECTION, &queue.to_string(), |state: &mut PartitionBatchState| {
            state.release(batch_id)
        })
        .await
    }

    async fn get_open_batch_metadata(&self, queue: QueueType) -> Result<Option<BatchMetadata>, StoreError> {
        let state: Option<PartitionBatchState> = self.read_versioned(BATCH_STATE_COLLECTION, &queue.to_string()).await?;
        Ok(state.and_then(|state| state.open).map(|open| open.metadata))
    }

    async fn add_pending_transaction(&self, transaction: &PendingTransaction) -> Result<(), StoreError> {
        let value = bson::to_bson(transaction)?;
        self.collection(PENDING_TRANSACTIONS_COLLECTION)
            .update_one(
                doc! { "_id": transaction.watch_key() },
                doc! { "$set": { "tx_hash": transaction.tx_hash.to_string(), "transaction": value } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn get_pending_transactions(&self) -> Result<Vec<PendingTransaction>, StoreError> {
        let cursor = self.collection(PENDING_TRANSACTIONS_COLLECTION).find(doc! {}, None).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        documents.iter().map(decode_pending_transaction).collect()
    }

    async fn get_pending_transaction_for_job(&self, job_id: &str) -> Result<Option<PendingTransaction>, StoreError> {
        let document = self
            .collection(PENDING_TRANSACTIONS_COLLECTION)
            .find_one(doc! { "transaction.reference_job.id": job_id }, None)
            .await?;
        document.as_ref().map(decode_pending_transaction).transpose()
    }

    async fn remove_pending_transactions(&self, tx_hashes: &[TxHash]) -> Result<u64, StoreError> {
        if tx_hashes.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = tx_hashes.iter().map(|hash| hash.to_string()).collect();
        let result =
            self.collection(PENDING_TRANSACTIONS_COLLECTION).delete_many(doc! { "tx_hash": { "$in": ids } }, None).await?;
        Ok(result.deleted_count)
    }

    async fn increment_epoch_usage(&self, epoch: u32, amount: u128, ttl: Duration) -> Result<u128, StoreError> {
        let key = epoch_key(epoch);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let used = self
            .compare_and_swap(EPOCH_USAGE_COLLECTION, &key, |usage: &mut EpochUsage| {
                let current = if usage.expires_at <= now { Ok(0) } else { usage.used(&key) };
                current.map(|current| {
                    let used = current.saturating_add(amount);
                    usage.used = used.to_string();
                    usage.expires_at = expires_at;
                    used
                })
            })
            .await?;
        used
    }

    async fn get_epoch_usage(&self, epoch: u32) -> Result<u128, StoreError> {
        let key = epoch_key(epoch);
        match self.read_versioned::<EpochUsage>(EPOCH_USAGE_COLLECTION, &key).await? {
            Some(usage) if usage.expires_at > Utc::now() => usage.used(&key),
            _ => Ok(0),
        }
    }

    async fn get_last_scanned_block(&self) -> Result<Option<u32>, StoreError> {
        let document = self.collection(SCANNER_STATE_COLLECTION).find_one(doc! { "_id": LAST_SCANNED_BLOCK_ID }, None).await?;
        match document {
            None => Ok(None),
            Some(document) => {
                let block_number = document.get_i64("block_number").map_err(|e| StoreError::InvalidValue {
                    key: LAST_SCANNED_BLOCK_ID.to_string(),
                    message: e.to_string(),
                })?;
                u32::try_from(block_number).map(Some).map_err(|e| StoreError::InvalidValue {
                    key: LAST_SCANNED_BLOCK_ID.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn set_last_scanned_block(&self, block_number: u32) -> Result<(), StoreError> {
        self.collection(SCANNER_STATE_COLLECTION)
            .update_one(
                doc! { "_id": LAST_SCANNED_BLOCK_ID },
                doc! { "$set": { "block_number": block_number as i64 } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }
}
