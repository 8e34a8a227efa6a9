use std::str::FromStr;

use publisher_chain_client_interface::DispatchError;
use strum_macros::EnumString;

/// What to do with the jobs of a transaction that failed on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Resubmit the original publish job
    Retry,
    /// Drop the job
    Fatal,
    /// Pause publishing, resubmit, and check again later
    PauseAndRetry,
}

/// Module errors of the messages and stateful storage pallets
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum ModuleError {
    TooManyMessagesInBlock,
    StalePageState,
    ProofHasExpired,
    ProofNotYetValid,
    InvalidSignature,
    #[strum(serialize = "UnAuthorizedDelegate", serialize = "UnauthorizedDelegate")]
    UnauthorizedDelegate,
    InvalidMessageSourceAccount,
    InvalidSchemaId,
    ExceedsMaxMessagePayloadSizeBytes,
    InvalidPayloadLocation,
    UnsupportedCid,
    InvalidCid,
    CorruptedState,
    PageIdExceedsMaxAllowed,
    PageExceedsMaxPageSizeBytes,
    SchemaPayloadLocationMismatch,
    UnsupportedOperationForSchema,
    InvalidItemAction,
}

impl ModuleError {
    pub fn action(self) -> FailureAction {
        match self {
            ModuleError::TooManyMessagesInBlock
            | ModuleError::StalePageState
            | ModuleError::ProofHasExpired
            | ModuleError::ProofNotYetValid
            | ModuleError::InvalidSignature => FailureAction::Retry,
            ModuleError::UnauthorizedDelegate
            | ModuleError::InvalidMessageSourceAccount
            | ModuleError::InvalidSchemaId
            | ModuleError::ExceedsMaxMessagePayloadSizeBytes
            | ModuleError::InvalidPayloadLocation
            | ModuleError::UnsupportedCid
            | ModuleError::InvalidCid
            | ModuleError::CorruptedState
            | ModuleError::PageIdExceedsMaxAllowed
            | ModuleError::PageExceedsMaxPageSizeBytes
            | ModuleError::SchemaPayloadLocationMismatch
            | ModuleError::UnsupportedOperationForSchema
            | ModuleError::InvalidItemAction => FailureAction::Fatal,
        }
    }
}

/// Unknown module errors and non-module dispatch errors pause publishing
pub fn classify(error: &DispatchError) -> FailureAction {
    match error {
        DispatchError::Module { error, .. } => {
            ModuleError::from_str(error).map(ModuleError::action).unwrap_or(FailureAction::PauseAndRetry)
        }
        DispatchError::Other(_) => FailureAction::PauseAndRetry,
    }
}
