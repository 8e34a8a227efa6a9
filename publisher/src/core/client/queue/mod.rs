pub mod error;
pub mod mongodb;

use std::time::Duration;

use async_trait::async_trait;
pub use error::QueueError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::queue::QueueType;
use crate::types::queue_control::queue_control;

/// A job handed out by [`JobQueue::consume`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub id: String,
    pub queue: QueueType,
    /// JSON payload
    pub payload: String,
    /// Attempts started so far, including the current one
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub failed_reason: Option<String>,
}

impl QueuedJob {
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        serde_json::from_str(&self.payload)
            .map_err(|e| QueueError::InvalidPayload { job_id: self.id.clone(), message: e.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub attempts: u32,
    /// Base delay of the exponential retry backoff
    pub backoff: Duration,
    /// Initial delay before the job becomes consumable
    pub delay: Option<Duration>,
    /// Drop the job instead of keeping it in the failed set
    pub remove_on_fail: bool,
    pub retain_completed: usize,
}

impl EnqueueOptions {
    pub fn for_queue(queue: QueueType) -> Self {
        let control = queue_control(queue);
        Self {
            attempts: control.attempts,
            backoff: control.backoff,
            delay: None,
            remove_on_fail: false,
            retain_completed: control.retain_completed,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Job counts of one queue, by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Durable job queue partitioned by [`QueueType`].
///
/// Delivery is at least once. Job ids are caller supplied and deduplicated for
/// as long as the job (or its completed record) is retained.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns false if a job with `job_id` already exists
    async fn enqueue(
        &self,
        queue: QueueType,
        job_id: &str,
        payload: String,
        options: EnqueueOptions,
    ) -> Result<bool, QueueError>;
    /// Next due job, or `None` while the queue is paused or empty
    async fn consume(&self, queue: QueueType) -> Result<Option<QueuedJob>, QueueError>;
    async fn complete(&self, queue: QueueType, job_id: &str) -> Result<(), QueueError>;
    /// Reschedules with backoff while attempts remain. `unrecoverable` skips the remaining attempts.
    async fn fail(&self, queue: QueueType, job_id: &str, reason: &str, unrecoverable: bool) -> Result<(), QueueError>;
    /// Reschedules the active job without counting the current attempt
    async fn delay(&self, queue: QueueType, job_id: &str, delay: Duration) -> Result<(), QueueError>;
    async fn pause(&self, queue: QueueType) -> Result<(), QueueError>;
    async fn resume(&self, queue: QueueType) -> Result<(), QueueError>;
    async fn is_paused(&self, queue: QueueType) -> Result<bool, QueueError>;
    /// Removes the job in any state. Returns false if it did not exist.
    async fn remove(&self, queue: QueueType, job_id: &str) -> Result<bool, QueueError>;
    async fn list_failed(&self, queue: QueueType) -> Result<Vec<QueuedJob>, QueueError>;
    /// Moves a failed job back to waiting with a fresh attempt budget
    async fn retry_failed(&self, queue: QueueType, job_id: &str) -> Result<bool, QueueError>;
    async fn counts(&self, queue: QueueType) -> Result<JobCounts, QueueError>;
}

/// Serializes `payload` and enqueues it with the control defaults of `queue`
pub async fn enqueue_json<T: Serialize + Sync>(
    queue_client: &dyn JobQueue,
    queue: QueueType,
    job_id: &str,
    payload: &T,
    options: Option<EnqueueOptions>,
) -> Result<bool, QueueError> {
    let payload = serde_json::to_string(payload).map_err(|e| QueueError::EncodeError(e.to_string()))?;
    queue_client.enqueue(queue, job_id, payload, options.unwrap_or_else(|| EnqueueOptions::for_queue(queue))).await
}
