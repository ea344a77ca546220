//! Errors raised while constructing or parsing core types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid threshold {num}/{den}: denominator must be non-zero and num <= den")]
    InvalidThreshold { num: u64, den: u64 },

    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),

    #[error("invalid hex identity: {0}")]
    InvalidIdentity(String),

    #[error("amount overflow")]
    Overflow,
}
