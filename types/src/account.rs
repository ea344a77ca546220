//! Ledger account as seen by the execution core.

use serde::{Deserialize, Serialize};

use crate::{Amount, Identity};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Identity,
    pub balance: Amount,
    /// Nonce of the last accepted spend; 0 for an account that never spent.
    pub nonce: u64,
}

impl Account {
    /// The zero-valued account returned for identities the ledger has never seen.
    pub fn empty(id: Identity) -> Self {
        Self {
            id,
            balance: Amount::ZERO,
            nonce: 0,
        }
    }

    pub fn is_unfunded(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0
    }
}
