use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("no open transaction to {0}")]
    NoTransaction(&'static str),

    #[error("cannot snapshot with {0} open transaction(s)")]
    TransactionOpen(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
