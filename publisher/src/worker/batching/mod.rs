//! Accumulates announcements of one queue into batches and hands closed batches to
//! the batch queue.
//!
//! A batch closes when it reaches `batching.max_count` rows or when it is older than
//! `batching.interval_seconds`, whichever happens first. Closing first moves the open
//! batch into a locked slot (see [`PartitionBatchState::lock`]) so appends can keep
//! going into a fresh batch while the locked one is drained.
//!
//! [`PartitionBatchState::lock`]: crate::types::batch::PartitionBatchState::lock

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::client::queue::{enqueue_json, QueuedJob};
use crate::core::config::Config;
use crate::core::timer::TimerRegistry;
use crate::error::job::batching::BatchingError;
use crate::error::job::JobError;
use crate::types::announcement::Announcement;
use crate::types::batch::{AppendOutcome, BatchMetadata, LockOutcome, LockedBatch};
use crate::types::jobs::{BatchAnnouncerJob, BatchQueueJob};
use crate::types::queue::QueueType;
use crate::worker::controller::JobProcessor;
use crate::worker::schema::SchemaRegistry;

/// Name of the close timer of `batch_id`
pub fn batch_timeout_name(queue: QueueType, batch_id: Uuid) -> String {
    format!("TIMEOUT:{}:{}", queue, batch_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    NothingToClose,
    /// Another closer holds a valid lock on the previous batch
    Deferred,
    Closed { batch_id: Uuid, row_count: u64 },
}

pub struct BatchAccumulator {
    config: Arc<Config>,
    timers: TimerRegistry,
    schemas: Arc<SchemaRegistry>,
    this: Weak<BatchAccumulator>,
}

impl BatchAccumulator {
    pub fn new(config: Arc<Config>, timers: TimerRegistry, schemas: Arc<SchemaRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self { config, timers, schemas, this: this.clone() })
    }

    /// append - Add `announcement` to the open batch of `queue`, returns the resulting row count
    ///
    /// The append that opens a batch arms its close timer. Reaching the max row count closes
    /// the batch right away.
    pub async fn append(&self, queue: QueueType, job_id: &str, announcement: &Announcement) -> Result<u64, BatchingError> {
        let expected = queue.announcement_type().ok_or(BatchingError::NotABatchingQueue(queue))?;
        if announcement.announcement_type() != expected {
            return Err(BatchingError::AnnouncementTypeMismatch {
                queue,
                announcement_type: announcement.announcement_type(),
            });
        }

        let candidate = BatchMetadata::new(Utc::now());
        let outcome = self.config.store().add_to_batch(queue, candidate, job_id, announcement).await?;
        let (batch_id, row_count, opened) = match outcome {
            AppendOutcome::Appended { batch_id, row_count, opened } => (batch_id, row_count, opened),
            AppendOutcome::Invalid => {
                error!(q = %queue, job_id = %job_id, "Open batch metadata does not match its records");
                return Err(BatchingError::InvalidBatchState { queue, job_id: job_id.to_string() });
            }
        };
        debug!(q = %queue, batch_id = %batch_id, row_count, "Appended announcement to batch");

        let batching = &self.config.settings().batching;
        if row_count >= batching.max_count {
            info!(q = %queue, batch_id = %batch_id, row_count, "Batch is full, closing");
            self.close_batch(queue, batch_id, false).await?;
        } else if opened {
            self.schedule_close(queue, batch_id, batching.interval());
        }
        Ok(row_count)
    }

    /// close_batch - Lock the open batch of `queue` and drain it into the batch queue
    ///
    /// Abandoned locks found on the way are drained first, at most
    /// `batching.max_lock_recoveries` times per call.
    pub async fn close_batch(
        &self,
        queue: QueueType,
        batch_id: Uuid,
        is_timeout: bool,
    ) -> Result<CloseOutcome, BatchingError> {
        let store = self.config.store();
        let batching = &self.config.settings().batching;

        if is_timeout {
            // the timer may belong to a batch that was already closed by count
            let open = store.get_open_batch_metadata(queue).await?;
            if open.as_ref().map(|metadata| metadata.batch_id) != Some(batch_id) {
                debug!(q = %queue, batch_id = %batch_id, "Timed out batch is no longer open");
                return Ok(CloseOutcome::NothingToClose);
            }
        }

        let mut recoveries = 0;
        loop {
            let outcome = store.lock_batch(queue, Utc::now(), batching.lock_duration()).await?;
            debug!(q = %queue, batch_id = %batch_id, is_timeout, status = outcome.status(), "Lock batch");

            match outcome {
                LockOutcome::Nothing => {
                    self.timers.cancel(&batch_timeout_name(queue, batch_id));
                    return Ok(CloseOutcome::NothingToClose);
                }
                LockOutcome::PreviousLockActive => {
                    info!(q = %queue, batch_id = %batch_id, "Previous batch is still being closed, deferring");
                    return Ok(CloseOutcome::Deferred);
                }
                LockOutcome::Locked(locked) => {
                    let closed = CloseOutcome::Closed {
                        batch_id: locked.metadata.batch_id,
                        row_count: locked.metadata.row_count,
                    };
                    self.drain(queue, locked).await?;
                    info!(q = %queue, batch_id = %batch_id, is_timeout, "Batch closed");
                    return Ok(closed);
                }
                LockOutcome::AbandonedLock(locked) => {
                    if recoveries >= batching.max_lock_recoveries {
                        error!(
                            q = %queue,
                            abandoned_batch_id = %locked.metadata.batch_id,
                            attempts = recoveries,
                            "Abandoned batch lock could not be cleared"
                        );
                        return Err(BatchingError::AbandonedLockNotCleared {
                            queue,
                            batch_id: locked.metadata.batch_id,
                            attempts: recoveries,
                        });
                    }
                    recoveries += 1;
                    warn!(
                        q = %queue,
                        abandoned_batch_id = %locked.metadata.batch_id,
                        rows = locked.records.len(),
                        "Recovering abandoned batch lock"
                    );
                    self.drain(queue, locked).await?;
                }
            }
        }
    }

    /// setup_active_batch_timeout - Re-arm or fire the close timer of a batch left open by a previous run
    pub async fn setup_active_batch_timeout(&self, queue: QueueType) -> Result<(), BatchingError> {
        let Some(metadata) = self.config.store().get_open_batch_metadata(queue).await? else {
            return Ok(());
        };

        let interval = self.config.settings().batching.interval();
        let age = metadata.age(Utc::now());
        if age >= interval {
            info!(q = %queue, batch_id = %metadata.batch_id, age_ms = age.as_millis() as u64, "Open batch expired while offline, closing");
            self.close_batch(queue, metadata.batch_id, true).await?;
        } else {
            self.schedule_close(queue, metadata.batch_id, interval - age);
        }
        Ok(())
    }

    fn schedule_close(&self, queue: QueueType, batch_id: Uuid, delay: Duration) {
        let this = self.this.clone();
        self.timers.schedule(batch_timeout_name(queue, batch_id), delay, async move {
            let Some(accumulator) = this.upgrade() else {
                return;
            };
            if let Err(e) = accumulator.close_batch(queue, batch_id, true).await {
                error!(q = %queue, batch_id = %batch_id, error = %e, "Failed to close batch on timeout");
            }
        });
    }

    /// Hands the locked batch to the batch queue, then deletes it
    async fn drain(&self, queue: QueueType, locked: LockedBatch) -> Result<(), BatchingError> {
        let batch_id = locked.metadata.batch_id;

        if !locked.records.is_empty() {
            let announcement_type = queue.announcement_type().ok_or(BatchingError::NotABatchingQueue(queue))?;
            let schema_id = self.schemas.schema_id_for(announcement_type).await?;
            let job = BatchQueueJob::New(BatchAnnouncerJob {
                batch_id,
                schema_id,
                announcements: locked.records.into_iter().map(|record| record.announcement).collect(),
            });
            let enqueued =
                enqueue_json(self.config.queue(), QueueType::BatchAnnouncement, &job.job_id(), &job, None).await?;
            if !enqueued {
                debug!(q = %queue, batch_id = %batch_id, "Batch job already queued");
            }
        }

        self.config.store().release_locked_batch(queue, batch_id).await?;
        self.timers.cancel(&batch_timeout_name(queue, batch_id));
        Ok(())
    }
}

/// Consumes one announcement queue into the accumulator
pub struct AnnouncementBatchingProcessor {
    accumulator: Arc<BatchAccumulator>,
}

impl AnnouncementBatchingProcessor {
    pub fn new(accumulator: Arc<BatchAccumulator>) -> Self {
        Self { accumulator }
    }
}

#[async_trait]
impl JobProcessor for AnnouncementBatchingProcessor {
    async fn process(&self, job: &QueuedJob) -> Result<(), JobError> {
        let announcement: Announcement = job.parse_payload()?;
        self.accumulator.append(job.queue, &job.id, &announcement).await?;
        Ok(())
    }
}
