use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("genesis error: {0}")]
    Genesis(String),

    #[error("executor error: {0}")]
    TxApp(#[from] tally_txapp::TxAppError),

    #[error("voting error: {0}")]
    Voting(#[from] tally_voting::VotingError),

    #[error("store error: {0}")]
    Store(#[from] tally_store::StoreError),

    #[error("types error: {0}")]
    Types(#[from] tally_types::TypesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
