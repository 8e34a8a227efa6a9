use publisher_chain_client_interface::ChainCall;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::announcement::Announcement;

/// A closed batch waiting to be encoded and pinned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnnouncerJob {
    pub batch_id: Uuid,
    pub schema_id: u16,
    pub announcements: Vec<Announcement>,
}

/// A batch file that is already pinned and only needs announcing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingBatchFile {
    pub cid: String,
    pub schema_id: u16,
}

/// Payload of the batch queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BatchQueueJob {
    New(BatchAnnouncerJob),
    Existing(ExistingBatchFile),
}

impl BatchQueueJob {
    /// Deterministic job id, so duplicate deliveries collapse in the queue
    pub fn job_id(&self) -> String {
        match self {
            BatchQueueJob::New(job) => job.batch_id.to_string(),
            BatchQueueJob::Existing(file) => file.cid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "location", rename_all = "camelCase")]
pub enum PublisherPayload {
    #[serde(rename_all = "camelCase")]
    Ipfs { cid: String, payload_length: u64 },
    #[serde(rename_all = "camelCase")]
    OnChain {
        /// hex encoded message payload
        payload: String,
        on_behalf_of: Option<u64>,
    },
}

/// Unit of work of the publish queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherJob {
    pub id: String,
    pub schema_id: u16,
    pub data: PublisherPayload,
}

impl PublisherJob {
    pub fn to_call(&self) -> ChainCall {
        match &self.data {
            PublisherPayload::Ipfs { cid, payload_length } => {
                ChainCall::AddIpfsMessage { schema_id: self.schema_id, cid: cid.clone(), payload_length: *payload_length }
            }
            PublisherPayload::OnChain { payload, on_behalf_of } => ChainCall::AddOnchainMessage {
                on_behalf_of: *on_behalf_of,
                schema_id: self.schema_id,
                payload: payload.clone(),
            },
        }
    }

    /// Delegator whose delegation must still be valid before publishing
    pub fn delegator(&self) -> Option<u64> {
        match &self.data {
            PublisherPayload::OnChain { on_behalf_of, .. } => *on_behalf_of,
            PublisherPayload::Ipfs { .. } => None,
        }
    }
}
