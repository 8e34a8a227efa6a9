use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::core::client::queue::{QueueError, QueuedJob};
use crate::core::config::Config;
use crate::error::job::{JobDisposition, JobError};
use crate::types::queue::QueueType;

const QUEUE_NO_MESSAGE_SLEEP_DURATION: Duration = Duration::from_millis(500);
const QUEUE_ERROR_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// Handles the jobs of one queue
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &QueuedJob) -> Result<(), JobError>;
}

/// Pool of at most `concurrency` in-flight jobs consuming one queue
pub struct QueueWorker {
    config: Arc<Config>,
    queue_type: QueueType,
    processor: Arc<dyn JobProcessor>,
    concurrency: usize,
    cancellation_token: CancellationToken,
}

impl QueueWorker {
    pub fn new(
        config: Arc<Config>,
        queue_type: QueueType,
        processor: Arc<dyn JobProcessor>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let concurrency = config.settings().queues.concurrency_for(queue_type).max(1);
        Self { config, queue_type, processor, concurrency, cancellation_token }
    }

    /// run - Consume the queue until the cancellation token fires, then drain in-flight jobs
    pub async fn run(self) {
        let mut tasks = JoinSet::new();
        info!(q = %self.queue_type, pool_size = self.concurrency, "Starting queue worker");

        loop {
            tokio::select! {
                biased;

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::handle_task_result(result);
                }

                _ = self.cancellation_token.cancelled() => {
                    info!(q = %self.queue_type, "Shutdown signal received, stopping queue worker");
                    break;
                }

                next = self.config.queue().consume(self.queue_type), if tasks.len() < self.concurrency => {
                    match next {
                        Ok(Some(job)) => {
                            let config = self.config.clone();
                            let processor = self.processor.clone();
                            let span = tracing::info_span!("job", q = %self.queue_type, id = %job.id);
                            tasks.spawn(async move { process_job(config, processor, job).await }.instrument(span));
                            debug!(q = %self.queue_type, active = tasks.len(), "Spawned job task");
                        }
                        Ok(None) => self.idle(QUEUE_NO_MESSAGE_SLEEP_DURATION).await,
                        Err(e) => {
                            error!(q = %self.queue_type, error = %e, "Failed to consume from queue");
                            self.idle(QUEUE_ERROR_SLEEP_DURATION).await;
                        }
                    }
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            Self::handle_task_result(result);
        }
        info!(q = %self.queue_type, "Queue worker stopped");
    }

    /// Sleeps unless shutdown is requested in the meantime
    async fn idle(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancellation_token.cancelled() => {}
        }
    }

    fn handle_task_result(result: Result<Result<(), QueueError>, JoinError>) {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to settle job in queue"),
            Err(e) if e.is_panic() => error!(error = %e, "Job task panicked"),
            Err(e) => warn!(error = %e, "Job task cancelled"),
        }
    }
}

/// Runs `processor` on `job` and settles the job according to the outcome
pub(crate) async fn process_job(
    config: Arc<Config>,
    processor: Arc<dyn JobProcessor>,
    job: QueuedJob,
) -> Result<(), QueueError> {
    let queue = config.queue();
    match processor.process(&job).await {
        Ok(()) => {
            debug!(attempt = job.attempts_made, "Job completed");
            queue.complete(job.queue, &job.id).await
        }
        Err(e) => match e.disposition() {
            JobDisposition::Delay(delay) => {
                info!(delay_ms = delay.as_millis() as u64, reason = %e, "Job delayed");
                queue.delay(job.queue, &job.id, delay).await
            }
            JobDisposition::Retry => {
                warn!(attempt = job.attempts_made, max_attempts = job.max_attempts, error = %e, "Job failed");
                queue.fail(job.queue, &job.id, &e.to_string(), false).await
            }
            JobDisposition::Fail => {
                error!(error = %e, error_chain = ?e, "Job failed permanently");
                queue.fail(job.queue, &job.id, &e.to_string(), true).await
            }
        },
    }
}
