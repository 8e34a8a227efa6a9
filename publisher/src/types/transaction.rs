use chrono::{DateTime, SubsecRound, Utc};
use publisher_chain_client_interface::{EventSelector, SubmittedTx, TxHash};
use serde::{Deserialize, Serialize};

use crate::types::jobs::PublisherJob;

/// Watch-list entry of a submitted, not yet reconciled, transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub tx_hash: TxHash,
    /// Event that marks the extrinsic as successful
    pub success_event: EventSelector,
    pub birth: u32,
    pub death: u32,
    pub reference_job: PublisherJob,
    pub submitted_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(tx: &SubmittedTx, success_event: EventSelector, reference_job: PublisherJob) -> Self {
        Self {
            tx_hash: tx.tx_hash.clone(),
            success_event,
            birth: tx.era.birth(tx.block_number),
            death: tx.era.death(tx.block_number),
            reference_job,
            submitted_at: Utc::now().round_subsecs(0),
        }
    }

    /// Watch-list key, unique per submitted job
    pub fn watch_key(&self) -> String {
        format!("{}:{}", self.tx_hash, self.reference_job.id)
    }

    /// The extrinsic can no longer be included at or after `block_number`
    pub fn is_expired(&self, block_number: u32) -> bool {
        self.death <= block_number
    }
}
