use tally_types::{Identity, ResolutionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VotingError {
    #[error("resolution type already registered: {0}")]
    DuplicateResolutionType(String),

    #[error("unknown resolution type: {0}")]
    UnknownResolutionType(String),

    #[error("resolution {0} already exists")]
    ResolutionExists(ResolutionId),

    #[error("resolution {0} has already been processed")]
    ResolutionProcessed(ResolutionId),

    #[error("resolution {0} does not exist")]
    ResolutionNotFound(ResolutionId),

    #[error("voter {0} is not a validator")]
    UnknownVoter(Identity),

    #[error("cannot set negative power {power} for {identity}")]
    NegativePower { identity: Identity, power: i64 },

    #[error("resolution type {0} is persisted but not registered")]
    UnregisteredPersistedType(String),

    #[error("invalid resolution body: {0}")]
    InvalidBody(String),

    #[error("resolution rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Store(#[from] tally_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] tally_ledger::LedgerError),
}
