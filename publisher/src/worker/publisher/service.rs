use std::sync::Arc;

use async_trait::async_trait;
use publisher_chain_client_interface::EventSelector;
use tracing::{debug, info, warn};

use crate::core::client::queue::QueuedJob;
use crate::core::config::Config;
use crate::error::job::publish::PublishError;
use crate::error::job::JobError;
use crate::types::jobs::PublisherJob;
use crate::types::transaction::PendingTransaction;
use crate::worker::capacity::{CapacityGate, CapacitySignal};
use crate::worker::controller::JobProcessor;
use crate::worker::publisher::message_publisher::{MessagePublisher, PublishOutcome};

/// Drives one publish job: watch-list check, capacity gate, delegation check, submission
pub struct PublishingService {
    config: Arc<Config>,
    gate: Arc<CapacityGate>,
    publisher: Arc<MessagePublisher>,
}

impl PublishingService {
    pub fn new(config: Arc<Config>, gate: Arc<CapacityGate>, publisher: Arc<MessagePublisher>) -> Self {
        Self { config, gate, publisher }
    }

    async fn publish(&self, job: PublisherJob) -> Result<(), JobError> {
        if let Some(watched) = self.config.store().get_pending_transaction_for_job(&job.id).await? {
            info!(job_id = %job.id, tx_hash = %watched.tx_hash, "Job is already watched, not submitting again");
            return Ok(());
        }

        if !self.gate.check_for_sufficient_capacity().await? {
            return Err(JobError::Delayed { delay: self.config.block_time(), reason: "insufficient capacity".into() });
        }

        if let Some(delegator_id) = job.delegator() {
            let valid =
                self.config.chain_client().check_delegation(delegator_id, job.schema_id, self.config.provider_id()).await?;
            if !valid {
                warn!(delegator_id, schema_id = job.schema_id, "Delegation is no longer valid");
                return Err(JobError::Unrecoverable(format!(
                    "MSA {} has no valid delegation to provider {} for schema {}",
                    delegator_id,
                    self.config.provider_id(),
                    job.schema_id
                )));
            }
        }

        match self.publisher.publish(job.clone()).await {
            Ok(PublishOutcome::Submitted(submission)) => {
                for watched in submission.jobs_to_watch(&job.id) {
                    let pending = PendingTransaction::new(&submission.tx, EventSelector::messages_in_block(), watched.clone());
                    self.config.store().add_pending_transaction(&pending).await?;
                    info!(
                        job_id = %watched.id,
                        tx_hash = %pending.tx_hash,
                        birth = pending.birth,
                        death = pending.death,
                        "Watching transaction"
                    );
                }
                self.publisher.release_unattended(&submission.unattended);
                Ok(())
            }
            Ok(PublishOutcome::AlreadySubmitted(tx)) => {
                debug!(job_id = %job.id, tx_hash = %tx.tx_hash, "Job went out with an earlier batch");
                Ok(())
            }
            Err(PublishError::NonceConflict(message)) => {
                debug!(reason = %message, "Nonce conflict, retrying after one block");
                Err(JobError::Delayed { delay: self.config.block_time(), reason: message })
            }
            Err(e) => {
                if e.is_capacity_exhausted() {
                    self.gate.signal(CapacitySignal::Exhausted);
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl JobProcessor for PublishingService {
    async fn process(&self, job: &QueuedJob) -> Result<(), JobError> {
        let publisher_job: PublisherJob = job.parse_payload()?;
        self.publish(publisher_job).await
    }
}
