//! Account ledger.
//!
//! Balances and nonces live in the `accounts` table of whatever transaction
//! handle the caller passes in, so a rolled-back savepoint undoes account
//! changes together with everything else written inside it. The ledger itself
//! only keeps the per-block spend log.

pub mod accounts;
pub mod error;

pub use accounts::{AccountLedger, Accounts, Spend, ACCOUNTS_TABLE};
pub use error::LedgerError;
