use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::bson::{self, doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EnqueueOptions, JobCounts, JobQueue, QueueError, QueuedJob};
use crate::config::types::store::MongoConfig;
use crate::core::client::store::mongodb::is_duplicate_key;
use crate::types::queue::QueueType;

const JOBS_COLLECTION: &str = "jobs";
const QUEUE_STATE_COLLECTION: &str = "queue_state";

/// An active job not completed, failed or delayed within this window is handed out again
const ACTIVE_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JobState {
    /// Consumable once `available_at` passed, delayed before that
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JobDocument {
    #[serde(rename = "_id")]
    id: String,
    queue: String,
    job_id: String,
    payload: String,
    state: JobState,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    available_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
    attempts_made: u32,
    max_attempts: u32,
    backoff_ms: u64,
    remove_on_fail: bool,
    retain_completed: u64,
    failed_reason: Option<String>,
}

impl JobDocument {
    fn into_queued(self, queue: QueueType) -> QueuedJob {
        QueuedJob {
            id: self.job_id,
            queue,
            payload: self.payload,
            attempts_made: self.attempts_made,
            max_attempts: self.max_attempts,
            failed_reason: self.failed_reason,
        }
    }
}

fn document_id(queue: QueueType, job_id: &str) -> String {
    format!("{}:{}", queue, job_id)
}

fn bson_time(time: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(time)
}

fn after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365))
}

fn backoff_for(backoff_ms: u64, attempts_made: u32) -> Duration {
    let exponent = attempts_made.saturating_sub(1).min(16);
    Duration::from_millis(backoff_ms).saturating_mul(1u32 << exponent)
}

/// MongoDB backed [`JobQueue`].
///
/// Every job is one document keyed by queue and job id, so ids deduplicate across
/// processes and restarts. Producers outside this process enqueue by inserting a
/// `waiting` document into the `jobs` collection.
pub struct MongoJobQueue {
    database: Database,
}

impl MongoJobQueue {
    pub async fn new(config: &MongoConfig) -> Result<Self, QueueError> {
        let client = Client::with_uri_str(&config.connection_uri).await?;
        Ok(Self { database: client.database(&config.database_name) })
    }

    fn jobs(&self) -> Collection<Document> {
        self.database.collection(JOBS_COLLECTION)
    }

    fn queue_state(&self) -> Collection<Document> {
        self.database.collection(QUEUE_STATE_COLLECTION)
    }

    /// Creates the index consume and counts filter on
    pub async fn setup_indexes(&self) -> Result<(), QueueError> {
        let due_index = IndexModel::builder()
            .keys(doc! { "queue": 1, "state": 1, "available_at": 1 })
            .options(IndexOptions::builder().name("queue_state_available_at".to_string()).build())
            .build();
        self.jobs().create_index(due_index, None).await?;
        debug!("Job queue index ensured");
        Ok(())
    }

    async fn find_job(&self, queue: QueueType, job_id: &str) -> Result<Option<JobDocument>, QueueError> {
        let document = self.jobs().find_one(doc! { "_id": document_id(queue, job_id) }, None).await?;
        Ok(match document {
            Some(document) => Some(bson::from_document(document)?),
            None => None,
        })
    }

    async fn count(&self, filter: Document) -> Result<usize, QueueError> {
        Ok(self.jobs().count_documents(filter, None).await? as usize)
    }

    /// Deletes the oldest completed records of `queue` beyond `retain`
    async fn trim_completed(&self, queue: QueueType, retain: u64) -> Result<(), QueueError> {
        let filter = doc! { "queue": queue.to_string(), "state": JobState::Completed.as_str() };
        let completed = self.jobs().count_documents(filter.clone(), None).await?;
        if completed <= retain {
            return Ok(());
        }

        let excess = (completed - retain) as i64;
        let options = FindOptions::builder().sort(doc! { "updated_at": 1, "_id": 1 }).limit(excess).build();
        let evicted: Vec<Document> = self.jobs().find(filter, options).await?.try_collect().await?;
        let ids: Vec<bson::Bson> = evicted.into_iter().filter_map(|document| document.get("_id").cloned()).collect();
        let deleted = self.jobs().delete_many(doc! { "_id": { "$in": ids } }, None).await?;
        debug!(q = %queue, deleted = deleted.deleted_count, "Trimmed completed jobs");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MongoJobQueue {
    async fn enqueue(
        &self,
        queue: QueueType,
        job_id: &str,
        payload: String,
        options: EnqueueOptions,
    ) -> Result<bool, QueueError> {
        let now = Utc::now();
        let job = JobDocument {
            id: document_id(queue, job_id),
            queue: queue.to_string(),
            job_id: job_id.to_string(),
            payload,
            state: JobState::Waiting,
            available_at: options.delay.map(after).unwrap_or(now),
            updated_at: now,
            attempts_made: 0,
            max_attempts: options.attempts.max(1),
            backoff_ms: options.backoff.as_millis() as u64,
            remove_on_fail: options.remove_on_fail,
            retain_completed: options.retain_completed as u64,
            failed_reason: None,
        };

        match self.jobs().insert_one(bson::to_document(&job)?, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => {
                debug!(q = %queue, id = %job_id, "Duplicate job id, skipping enqueue");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn consume(&self, queue: QueueType) -> Result<Option<QueuedJob>, QueueError> {
        if self.is_paused(queue).await? {
            return Ok(None);
        }

        let now = Utc::now();
        let lease_expired = now - chrono::Duration::from_std(ACTIVE_LEASE).unwrap_or_else(|_| chrono::Duration::minutes(5));
        let filter = doc! {
            "queue": queue.to_string(),
            "$or": [
                { "state": JobState::Waiting.as_str(), "available_at": { "$lte": bson_time(now) } },
                { "state": JobState::Active.as_str(), "updated_at": { "$lte": bson_time(lease_expired) } },
            ],
        };
        let update = doc! {
            "$set": { "state": JobState::Active.as_str(), "updated_at": bson_time(now) },
            "$inc": { "attempts_made": 1 },
        };
        let options = FindOneAndUpdateOptions::builder()
            .sort(doc! { "available_at": 1, "_id": 1 })
            .return_document(ReturnDocument::After)
            .build();

        match self.jobs().find_one_and_update(filter, update, options).await? {
            Some(document) => Ok(Some(bson::from_document::<JobDocument>(document)?.into_queued(queue))),
            None => Ok(None),
        }
    }

    async fn complete(&self, queue: QueueType, job_id: &str) -> Result<(), QueueError> {
        let update = doc! { "$set": { "state": JobState::Completed.as_str(), "updated_at": bson_time(Utc::now()) } };
        let options = FindOneAndUpdateOptions::builder().return_document(ReturnDocument::After).build();
        let Some(document) =
            self.jobs().find_one_and_update(doc! { "_id": document_id(queue, job_id) }, update, options).await?
        else {
            return Ok(());
        };
        let job: JobDocument = bson::from_document(document)?;
        self.trim_completed(queue, job.retain_completed).await
    }

    async fn fail(&self, queue: QueueType, job_id: &str, reason: &str, unrecoverable: bool) -> Result<(), QueueError> {
        let Some(job) = self.find_job(queue, job_id).await? else {
            return Ok(());
        };
        let filter = doc! { "_id": job.id.as_str() };

        if !unrecoverable && job.attempts_made < job.max_attempts {
            let delay = backoff_for(job.backoff_ms, job.attempts_made);
            debug!(q = %queue, id = %job_id, attempt = job.attempts_made, delay_ms = delay.as_millis() as u64, "Job scheduled for retry");
            let update = doc! { "$set": {
                "state": JobState::Waiting.as_str(),
                "available_at": bson_time(after(delay)),
                "updated_at": bson_time(Utc::now()),
                "failed_reason": reason,
            } };
            self.jobs().update_one(filter, update, None).await?;
            return Ok(());
        }

        if job.remove_on_fail {
            self.jobs().delete_one(filter, None).await?;
        } else {
            let update = doc! { "$set": {
                "state": JobState::Failed.as_str(),
                "updated_at": bson_time(Utc::now()),
                "failed_reason": reason,
            } };
            self.jobs().update_one(filter, update, None).await?;
        }
        warn!(q = %queue, id = %job_id, reason = %reason, unrecoverable, "Job moved to failed");
        Ok(())
    }

    async fn delay(&self, queue: QueueType, job_id: &str, delay: Duration) -> Result<(), QueueError> {
        let job = self
            .find_job(queue, job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound { queue, job_id: job_id.to_string() })?;
        let attempts_made = i64::from(job.attempts_made.saturating_sub(1));
        let update = doc! { "$set": {
            "state": JobState::Waiting.as_str(),
            "available_at": bson_time(after(delay)),
            "updated_at": bson_time(Utc::now()),
            "attempts_made": attempts_made,
        } };
        self.jobs().update_one(doc! { "_id": job.id.as_str() }, update, None).await?;
        Ok(())
    }

    async fn pause(&self, queue: QueueType) -> Result<(), QueueError> {
        self.queue_state()
            .update_one(
                doc! { "_id": queue.to_string() },
                doc! { "$set": { "paused": true } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn resume(&self, queue: QueueType) -> Result<(), QueueError> {
        self.queue_state()
            .update_one(
                doc! { "_id": queue.to_string() },
                doc! { "$set": { "paused": false } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn is_paused(&self, queue: QueueType) -> Result<bool, QueueError> {
        let document = self.queue_state().find_one(doc! { "_id": queue.to_string() }, None).await?;
        Ok(document.is_some_and(|document| document.get_bool("paused").unwrap_or(false)))
    }

    async fn remove(&self, queue: QueueType, job_id: &str) -> Result<bool, QueueError> {
        let deleted = self.jobs().delete_one(doc! { "_id": document_id(queue, job_id) }, None).await?;
        Ok(deleted.deleted_count > 0)
    }

    async fn list_failed(&self, queue: QueueType) -> Result<Vec<QueuedJob>, QueueError> {
        let options = FindOptions::builder().sort(doc! { "job_id": 1 }).build();
        let cursor = self
            .jobs()
            .find(doc! { "queue": queue.to_string(), "state": JobState::Failed.as_str() }, options)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        documents
            .into_iter()
            .map(|document| Ok(bson::from_document::<JobDocument>(document)?.into_queued(queue)))
            .collect()
    }

    async fn retry_failed(&self, queue: QueueType, job_id: &str) -> Result<bool, QueueError> {
        let now = bson_time(Utc::now());
        let updated = self
            .jobs()
            .update_one(
                doc! { "_id": document_id(queue, job_id), "state": JobState::Failed.as_str() },
                doc! { "$set": {
                    "state": JobState::Waiting.as_str(),
                    "available_at": now,
                    "updated_at": now,
                    "attempts_made": 0_i64,
                    "failed_reason": bson::Bson::Null,
                } },
                None,
            )
            .await?;
        Ok(updated.modified_count > 0)
    }

    async fn counts(&self, queue: QueueType) -> Result<JobCounts, QueueError> {
        let queue_name = queue.to_string();
        let now = bson_time(Utc::now());
        let waiting = JobState::Waiting.as_str();
        Ok(JobCounts {
            waiting: self.count(doc! { "queue": queue_name.as_str(), "state": waiting, "available_at": { "$lte": now } }).await?,
            delayed: self.count(doc! { "queue": queue_name.as_str(), "state": waiting, "available_at": { "$gt": now } }).await?,
            active: self.count(doc! { "queue": queue_name.as_str(), "state": JobState::Active.as_str() }).await?,
            completed: self.count(doc! { "queue": queue_name.as_str(), "state": JobState::Completed.as_str() }).await?,
            failed: self.count(doc! { "queue": queue_name.as_str(), "state": JobState::Failed.as_str() }).await?,
        })
    }
}
