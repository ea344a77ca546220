use tally_types::{Amount, Identity};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account {account} has insufficient funds: needs {needed}, has {balance}")]
    InsufficientFunds {
        account: Identity,
        needed: Amount,
        balance: Amount,
    },

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("account not found: {0}")]
    AccountNotFound(Identity),

    #[error("balance overflow for account {0}")]
    Overflow(Identity),

    #[error("storage error: {0}")]
    Store(#[from] tally_store::StoreError),
}
