use tally_types::{Amount, Identity, PayloadType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("{0} transactions are not accepted while the network is migrating")]
    NetworkInMigration(PayloadType),

    #[error("sender {0} is not a validator")]
    NotAValidator(Identity),

    #[error("too many resolution IDs in one vote: {count} > {max}")]
    TooManyVotes { count: usize, max: usize },

    #[error("account {0} has no funds")]
    Unfunded(Identity),

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("insufficient balance: needs {needed}, has {balance}")]
    InsufficientBalance { needed: Amount, balance: Amount },

    #[error("ledger error: {0}")]
    Ledger(#[from] tally_ledger::LedgerError),
}
