use publisher_chain_client_interface::{
    CapacityInfo, ChainEvent, EventRecord, FinalizedBlock, ModelType, MortalEra, PayloadLocation, Phase, SchemaInfo,
    SubmittedTx, TxHash,
};
use rstest::fixture;

use crate::core::client::queue::QueuedJob;
use crate::types::announcement::{Announcement, BroadcastAnnouncement};
use crate::types::jobs::{PublisherJob, PublisherPayload};
use crate::types::queue::QueueType;
use crate::worker::announcer::batch_file::tests::BROADCAST_MODEL;

pub const BROADCAST_SCHEMA_ID: u16 = 16001;
pub const EPOCH: u32 = 5;

pub fn broadcast(from_id: u64) -> Announcement {
    Announcement::Broadcast(BroadcastAnnouncement {
        from_id,
        content_hash: format!("bciq{from_id}"),
        url: format!("https://example.com/announcements/{from_id}"),
    })
}

#[fixture]
pub fn broadcast_schema() -> SchemaInfo {
    SchemaInfo {
        id: BROADCAST_SCHEMA_ID,
        model: BROADCAST_MODEL.to_string(),
        model_type: ModelType::Parquet,
        payload_location: PayloadLocation::Ipfs,
    }
}

pub fn ipfs_job(id: &str) -> PublisherJob {
    PublisherJob {
        id: id.to_string(),
        schema_id: BROADCAST_SCHEMA_ID,
        data: PublisherPayload::Ipfs { cid: format!("bafy-{id}"), payload_length: 1024 },
    }
}

pub fn on_chain_job(id: &str, on_behalf_of: u64) -> PublisherJob {
    PublisherJob {
        id: id.to_string(),
        schema_id: 7,
        data: PublisherPayload::OnChain { payload: "0x0102".into(), on_behalf_of: Some(on_behalf_of) },
    }
}

/// Job as a queue worker would hand it to a processor
pub fn queued_job<T: serde::Serialize>(queue: QueueType, id: &str, payload: &T) -> QueuedJob {
    QueuedJob {
        id: id.to_string(),
        queue,
        payload: serde_json::to_string(payload).unwrap(),
        attempts_made: 1,
        max_attempts: 3,
        failed_reason: None,
    }
}

/// Signed against block 10 with a 64 block era: valid until block 64
pub fn submitted_tx(tx_hash: &str) -> SubmittedTx {
    SubmittedTx { tx_hash: tx_hash.into(), era: MortalEra { period: 64, phase: 0 }, block_number: 10 }
}

pub fn capacity_info(remaining: u128, issued: u128) -> CapacityInfo {
    CapacityInfo {
        provider_id: 1,
        current_block_number: 100,
        next_epoch_start: 110,
        remaining_capacity: remaining,
        total_capacity_issued: issued,
        current_epoch: EPOCH,
    }
}

/// Finalized block holding `tx_hash` as its first extrinsic, followed by `events`
pub fn block_with_extrinsic(number: u32, tx_hash: &str, events: Vec<ChainEvent>) -> FinalizedBlock {
    FinalizedBlock {
        number,
        hash: format!("0xblock{number}"),
        capacity_epoch: EPOCH,
        extrinsic_hashes: vec!["0xtimestamp".into(), TxHash::from(tx_hash)],
        events: events.into_iter().map(|event| EventRecord { phase: Phase::ApplyExtrinsic(1), event }).collect(),
    }
}

pub fn empty_block(number: u32) -> FinalizedBlock {
    FinalizedBlock {
        number,
        hash: format!("0xblock{number}"),
        capacity_epoch: EPOCH,
        extrinsic_hashes: vec!["0xtimestamp".into()],
        events: vec![EventRecord { phase: Phase::ApplyExtrinsic(0), event: ChainEvent::ExtrinsicSuccess }],
    }
}
