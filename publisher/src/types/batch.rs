//! Batch state of a single announcement queue and the transitions applied to it.
//!
//! Every transition is a pure function over [`PartitionBatchState`]. Store backends
//! apply them atomically (a mutex for the in-memory store, a versioned
//! compare-and-swap for MongoDB), so metadata and records always change together.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::announcement::Announcement;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub batch_id: Uuid,
    pub start_timestamp: DateTime<Utc>,
    pub row_count: u64,
}

impl BatchMetadata {
    /// Candidate metadata used if the append ends up opening a new batch
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { batch_id: Uuid::new_v4(), start_timestamp: now.round_subsecs(3), row_count: 0 }
    }

    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.start_timestamp).to_std().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub job_id: String,
    pub announcement: Announcement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBatch {
    pub metadata: BatchMetadata,
    pub records: Vec<BatchRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedBatch {
    pub metadata: BatchMetadata,
    pub records: Vec<BatchRecord>,
    pub lock_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// `opened` is set when this append created the batch
    Appended { batch_id: Uuid, row_count: u64, opened: bool },
    /// Metadata and records disagree; the batch can not be trusted
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// No open batch
    Nothing,
    /// The open batch moved into the locked slot
    Locked(LockedBatch),
    /// A previous lock expired before it was released. The caller drains it first.
    AbandonedLock(LockedBatch),
    /// Another closer holds a valid lock
    PreviousLockActive,
}

impl LockOutcome {
    /// Numeric status as reported in logs (`0`, `1`, `-1`, `-2`)
    pub fn status(&self) -> i8 {
        match self {
            LockOutcome::Nothing => 0,
            LockOutcome::Locked(_) => 1,
            LockOutcome::AbandonedLock(_) => -1,
            LockOutcome::PreviousLockActive => -2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBatchState {
    pub open: Option<OpenBatch>,
    pub locked: Option<LockedBatch>,
}

impl PartitionBatchState {
    /// Appends a record to the open batch, opening one from `candidate` if needed.
    /// A job id already present in the open batch is not appended twice.
    pub fn append(&mut self, candidate: BatchMetadata, job_id: &str, announcement: &Announcement) -> AppendOutcome {
        let record = BatchRecord { job_id: job_id.to_string(), announcement: announcement.clone() };
        let Some(open) = self.open.as_mut() else {
            let metadata = BatchMetadata { row_count: 1, ..candidate };
            let batch_id = metadata.batch_id;
            self.open = Some(OpenBatch { metadata, records: vec![record] });
            return AppendOutcome::Appended { batch_id, row_count: 1, opened: true };
        };

        if open.metadata.row_count != open.records.len() as u64 {
            return AppendOutcome::Invalid;
        }
        if !open.records.iter().any(|existing| existing.job_id == job_id) {
            open.records.push(record);
            open.metadata.row_count += 1;
        }
        AppendOutcome::Appended { batch_id: open.metadata.batch_id, row_count: open.metadata.row_count, opened: false }
    }

    pub fn lock(&mut self, now: DateTime<Utc>, lock_duration: Duration) -> LockOutcome {
        if let Some(locked) = self.locked.as_mut() {
            if locked.lock_expires_at > now {
                return LockOutcome::PreviousLockActive;
            }
            // re-stamp so that a single closer owns the recovery
            locked.lock_expires_at = now + lock_duration;
            return LockOutcome::AbandonedLock(locked.clone());
        }

        match self.open.take() {
            None => LockOutcome::Nothing,
            Some(open) => {
                let locked =
                    LockedBatch { metadata: open.metadata, records: open.records, lock_expires_at: now + lock_duration };
                self.locked = Some(locked.clone());
                LockOutcome::Locked(locked)
            }
        }
    }

    /// Drops the locked batch if it still is `batch_id`
    pub fn release(&mut self, batch_id: Uuid) -> bool {
        match &self.locked {
            Some(locked) if locked.metadata.batch_id == batch_id => {
                self.locked = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_none() && self.locked.is_none()
    }
}
