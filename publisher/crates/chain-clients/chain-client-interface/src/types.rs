use std::fmt;

use serde::{Deserialize, Serialize};

/// Hex encoded extrinsic hash (`0x` prefixed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A single call wrapped into a capacity paid batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainCall {
    AddIpfsMessage {
        schema_id: u16,
        cid: String,
        payload_length: u64,
    },
    AddOnchainMessage {
        on_behalf_of: Option<u64>,
        schema_id: u16,
        /// hex encoded payload
        payload: String,
    },
}

/// Mortality window of a signed extrinsic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MortalEra {
    pub period: u32,
    pub phase: u32,
}

impl MortalEra {
    /// First block the extrinsic is valid in, given the block it was signed against.
    pub fn birth(&self, current: u32) -> u32 {
        if self.period == 0 {
            return current;
        }
        (current.max(self.phase) - self.phase) / self.period * self.period + self.phase
    }

    /// Block at which the extrinsic stops being valid.
    pub fn death(&self, current: u32) -> u32 {
        self.birth(current).saturating_add(self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTx {
    pub tx_hash: TxHash,
    pub era: MortalEra,
    /// Block the extrinsic was signed against
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityInfo {
    pub provider_id: u64,
    pub current_block_number: u32,
    pub next_epoch_start: u32,
    pub remaining_capacity: u128,
    pub total_capacity_issued: u128,
    pub current_epoch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    AvroBinary,
    Parquet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadLocation {
    OnChain,
    Ipfs,
    Itemized,
    Paginated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub id: u16,
    /// Raw schema model, a JSON document
    pub model: String,
    pub model_type: ModelType,
    pub payload_location: PayloadLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchError {
    Module { pallet: String, error: String },
    Other(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Module { pallet, error } => write!(f, "{}.{}", pallet, error),
            DispatchError::Other(description) => f.write_str(description),
        }
    }
}

/// `section.method` pair identifying a chain event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSelector {
    pub section: String,
    pub method: String,
}

impl EventSelector {
    pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
        Self { section: section.into(), method: method.into() }
    }

    /// Emitted by the messages pallet once per block that stored messages
    pub fn messages_in_block() -> Self {
        Self::new("messages", "MessagesInBlock")
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    MessagesInBlock,
    ExtrinsicSuccess,
    ExtrinsicFailed { error: DispatchError },
    CapacityWithdrawn { msa_id: u64, amount: u128 },
    CapacityStaked { target: u64, amount: u128 },
    CapacityUnStaked { target: u64, amount: u128 },
    Other { section: String, method: String },
}

impl ChainEvent {
    pub fn selector(&self) -> EventSelector {
        match self {
            ChainEvent::MessagesInBlock => EventSelector::messages_in_block(),
            ChainEvent::ExtrinsicSuccess => EventSelector::new("system", "ExtrinsicSuccess"),
            ChainEvent::ExtrinsicFailed { .. } => EventSelector::new("system", "ExtrinsicFailed"),
            ChainEvent::CapacityWithdrawn { .. } => EventSelector::new("capacity", "CapacityWithdrawn"),
            ChainEvent::CapacityStaked { .. } => EventSelector::new("capacity", "Staked"),
            ChainEvent::CapacityUnStaked { .. } => EventSelector::new("capacity", "UnStaked"),
            ChainEvent::Other { section, method } => EventSelector::new(section.clone(), method.clone()),
        }
    }

    pub fn matches(&self, selector: &EventSelector) -> bool {
        self.selector() == *selector
    }

    pub fn is_stake_change(&self) -> bool {
        matches!(self, ChainEvent::CapacityStaked { .. } | ChainEvent::CapacityUnStaked { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub phase: Phase,
    pub event: ChainEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBlock {
    pub number: u32,
    pub hash: String,
    /// Capacity epoch the block belongs to
    pub capacity_epoch: u32,
    /// Extrinsic hashes in block order; the position is the extrinsic index
    pub extrinsic_hashes: Vec<TxHash>,
    pub events: Vec<EventRecord>,
}

impl FinalizedBlock {
    pub fn extrinsic_index(&self, tx_hash: &TxHash) -> Option<u32> {
        self.extrinsic_hashes.iter().position(|hash| hash == tx_hash).map(|index| index as u32)
    }

    /// Events emitted while applying the extrinsic at `index`
    pub fn extrinsic_events(&self, index: u32) -> impl Iterator<Item = &ChainEvent> {
        self.events
            .iter()
            .filter(move |record| record.phase == Phase::ApplyExtrinsic(index))
            .map(|record| &record.event)
    }
}
