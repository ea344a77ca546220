use tally_types::PayloadType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxAppError {
    #[error("route for payload type {0} already registered")]
    DuplicateRoute(PayloadType),

    #[error("no route for payload type {0}")]
    UnknownRoute(PayloadType),

    #[error("invalid stored data: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Store(#[from] tally_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] tally_ledger::LedgerError),

    #[error("voting error: {0}")]
    Voting(#[from] tally_voting::VotingError),

    #[error("mempool rejected transaction: {0}")]
    Mempool(#[from] tally_mempool::MempoolError),

    #[error("pricing failed: {0}")]
    Price(String),
}
