//! Fundamental types for the tally execution and voting core.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: identities, resolution IDs, amounts, voting thresholds,
//! transactions and their payloads, response codes, and the per-block
//! execution contexts handed to the router.

pub mod account;
pub mod amount;
pub mod code;
pub mod error;
pub mod event;
pub mod identity;
pub mod params;
pub mod resolution_id;
pub mod threshold;
pub mod transaction;
pub mod validator;

pub use account::Account;
pub use amount::Amount;
pub use code::TxCode;
pub use error::TypesError;
pub use event::VotableEvent;
pub use identity::Identity;
pub use params::{
    BlockContext, ChainContext, MigrationStatus, NetworkParams, TxContext, DEFAULT_JOIN_EXPIRY,
    DEFAULT_MAX_VOTES_PER_TX,
};
pub use resolution_id::ResolutionId;
pub use threshold::{required_power, Threshold};
pub use transaction::{Payload, PayloadType, Transaction, TxBody};
pub use validator::{total_power, Validator};
