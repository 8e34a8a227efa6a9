use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use publisher_chain_client_interface::{ChainCall, SubmittedTx};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::error::job::publish::PublishError;
use crate::types::jobs::PublisherJob;

/// How long a job that went out without a waiting caller is remembered for its redelivery
const UNATTENDED_RETENTION: Duration = Duration::from_secs(3600);

type SubmissionFuture = Shared<BoxFuture<'static, Result<BatchSubmission, PublishError>>>;

/// One successful submission, shared by every caller of the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSubmission {
    pub tx: SubmittedTx,
    /// Every job included in the transaction
    pub jobs: Vec<PublisherJob>,
    /// Included jobs kept from an earlier failed batch whose callers already gave up
    pub unattended: Vec<String>,
}

impl BatchSubmission {
    /// Jobs the caller of `job_id` has to watch: its own and the unattended ones
    pub fn jobs_to_watch<'a>(&'a self, job_id: &'a str) -> impl Iterator<Item = &'a PublisherJob> + 'a {
        self.jobs.iter().filter(move |job| job.id == job_id || self.unattended.contains(&job.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Submitted(BatchSubmission),
    /// The job already went out with an earlier batch while its caller was not waiting
    AlreadySubmitted(SubmittedTx),
}

struct ActiveBatch {
    id: u64,
    /// Cancelled to submit before the block time elapsed
    flush: CancellationToken,
    /// Jobs whose callers wait on `result`
    members: HashSet<String>,
    result: SubmissionFuture,
}

#[derive(Default)]
struct PublisherState {
    pending: VecDeque<PublisherJob>,
    /// Leading jobs of `pending` included in the submission in flight
    claimed: usize,
    /// Batch still collecting callers
    open: Option<ActiveBatch>,
    /// Batch whose submission is running
    in_flight: Option<ActiveBatch>,
    unattended: HashMap<String, (SubmittedTx, Instant)>,
    next_batch_id: u64,
}

/// Coalesces concurrent publish calls into one capacity paid submission per block time.
///
/// Every caller that joined a batch receives the same [`BatchSubmission`]. Jobs leave the
/// pending queue only once their submission succeeded. After a failure they are kept
/// and go out with the next batch; their redelivered jobs then resolve to that
/// transaction instead of being submitted again.
pub struct MessagePublisher {
    config: Arc<Config>,
    state: Mutex<PublisherState>,
    submission_lock: tokio::sync::Mutex<()>,
}

impl MessagePublisher {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, state: Mutex::new(PublisherState::default()), submission_lock: tokio::sync::Mutex::new(()) }
    }

    fn state(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// Forget unattended jobs once their watch-list entries exist
    pub fn release_unattended(&self, job_ids: &[String]) {
        let mut state = self.state();
        for job_id in job_ids {
            state.unattended.remove(job_id);
        }
    }

    /// publish - Queue `job` for the next submission and wait for it
    pub async fn publish(self: &Arc<Self>, job: PublisherJob) -> Result<PublishOutcome, PublishError> {
        let max_batch_size = self.config.settings().publishing.max_batch_size.max(1);

        let result = {
            let mut state = self.state();
            if let Some((tx, _)) = state.unattended.remove(&job.id) {
                info!(job_id = %job.id, tx_hash = %tx.tx_hash, "Job already went out with an earlier batch");
                return Ok(PublishOutcome::AlreadySubmitted(tx));
            }

            let in_flight = match state.pending.iter().position(|pending| pending.id == job.id) {
                Some(position) if position < state.claimed => state.in_flight.as_mut().map(|batch| {
                    debug!(job_id = %job.id, batch = batch.id, "Job is part of the submission in flight");
                    batch.members.insert(job.id.clone());
                    batch.result.clone()
                }),
                Some(_) => {
                    debug!(job_id = %job.id, "Job is already pending submission");
                    None
                }
                None => {
                    state.pending.push_back(job.clone());
                    None
                }
            };

            match in_flight {
                Some(result) => result,
                None => {
                    let full = state.pending.len() - state.claimed >= max_batch_size;
                    let mut batch = match state.open.take() {
                        Some(batch) => batch,
                        None => {
                            state.next_batch_id += 1;
                            self.new_batch(state.next_batch_id)
                        }
                    };
                    batch.members.insert(job.id.clone());
                    if full {
                        batch.flush.cancel();
                    }
                    let result = batch.result.clone();
                    state.open = Some(batch);
                    result
                }
            }
        };

        result.await.map(PublishOutcome::Submitted)
    }

    fn new_batch(self: &Arc<Self>, id: u64) -> ActiveBatch {
        let flush = CancellationToken::new();
        let this = Arc::clone(self);
        let block_time = self.config.block_time();
        let flushed = flush.clone();
        let result = async move {
            tokio::select! {
                _ = tokio::time::sleep(block_time) => {}
                _ = flushed.cancelled() => debug!(batch = id, "Batch flushed early"),
            }
            this.process_batch(id).await
        }
        .boxed()
        .shared();

        ActiveBatch { id, flush, members: HashSet::new(), result }
    }

    /// process_batch - Submit every pending job as one atomic batch
    async fn process_batch(&self, id: u64) -> Result<BatchSubmission, PublishError> {
        let _submission = self.submission_lock.lock().await;

        let calls: Vec<ChainCall> = {
            let mut state = self.state();
            if state.open.as_ref().is_some_and(|batch| batch.id == id) {
                state.in_flight = state.open.take();
            }
            state.claimed = state.pending.len();
            state.pending.iter().map(PublisherJob::to_call).collect()
        };

        let submitted = if calls.is_empty() {
            Err(PublishError::EmptyBatch)
        } else {
            let count = calls.len();
            match self.config.chain_client().submit_with_capacity(calls).await {
                Ok(tx) => {
                    info!(batch = id, jobs = count, tx_hash = %tx.tx_hash, block_number = tx.block_number, "Submitted batch");
                    Ok(tx)
                }
                Err(e) => {
                    warn!(batch = id, jobs = count, error = %e, "Batch submission failed");
                    Err(PublishError::from(e))
                }
            }
        };

        let mut state = self.state();
        let members = match state.in_flight.take() {
            Some(batch) if batch.id == id => batch.members,
            other => {
                state.in_flight = other;
                HashSet::new()
            }
        };
        let claimed = std::mem::take(&mut state.claimed);

        let tx = submitted?;
        let jobs: Vec<PublisherJob> = state.pending.drain(..claimed).collect();
        let now = Instant::now();
        state.unattended.retain(|_, (_, at)| now.duration_since(*at) < UNATTENDED_RETENTION);

        let mut unattended = Vec::new();
        for job in jobs.iter().filter(|job| !members.contains(&job.id)) {
            debug!(batch = id, job_id = %job.id, "Included job has no waiting caller");
            state.unattended.insert(job.id.clone(), (tx.clone(), now));
            unattended.push(job.id.clone());
        }
        Ok(BatchSubmission { tx, jobs, unattended })
    }
}
