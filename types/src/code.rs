//! Transaction response codes reported back to submitters.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum TxCode {
    Ok = 0,
    InvalidTxType = 3,
    InvalidSender = 4,
    InvalidAmount = 5,
    InsufficientBalance = 6,
    InsufficientFee = 7,
    NetworkInMigration = 8,
    InvalidResolutionType = 9,
    UnknownError = u32::MAX,
}

impl TxCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, TxCode::Ok)
    }

    /// Codes for which the spend made by the transaction must be persisted
    /// even though the transaction did not reach its handler.
    pub fn keeps_spend(&self) -> bool {
        matches!(
            self,
            TxCode::Ok | TxCode::InsufficientBalance | TxCode::InsufficientFee
        )
    }
}

impl fmt::Display for TxCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxCode::Ok => "ok",
            TxCode::InvalidTxType => "invalid_tx_type",
            TxCode::InvalidSender => "invalid_sender",
            TxCode::InvalidAmount => "invalid_amount",
            TxCode::InsufficientBalance => "insufficient_balance",
            TxCode::InsufficientFee => "insufficient_fee",
            TxCode::NetworkInMigration => "network_in_migration",
            TxCode::InvalidResolutionType => "invalid_resolution_type",
            TxCode::UnknownError => "unknown_error",
        };
        f.write_str(s)
    }
}
