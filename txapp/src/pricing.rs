//! Fixed route prices.

use tally_types::Amount;

pub const TRANSFER_PRICE: Amount = Amount::new(210_000);
pub const VALIDATOR_JOIN_PRICE: Amount = Amount::new(10_000_000_000_000);
pub const VALIDATOR_APPROVE_PRICE: Amount = Amount::new(10_000_000_000_000);
pub const VALIDATOR_LEAVE_PRICE: Amount = Amount::new(10_000_000_000_000);
pub const VALIDATOR_REMOVE_PRICE: Amount = Amount::new(100_000);

/// Price of one resolution ID in a vote, and the flat reward for casting it.
pub const VALIDATOR_VOTE_ID_PRICE: Amount = Amount::new(16_000);

/// Price per body byte of a proposed resolution, and the proposer's reward
/// rate.
pub const VALIDATOR_VOTE_BODY_BYTE_PRICE: u128 = 1_000;

/// `VALIDATOR_VOTE_BODY_BYTE_PRICE * bytes`, saturating.
pub fn body_price(bytes: usize) -> Amount {
    Amount::new(VALIDATOR_VOTE_BODY_BYTE_PRICE.saturating_mul(bytes as u128))
}

/// `VALIDATOR_VOTE_ID_PRICE * count`, saturating.
pub fn vote_ids_price(count: usize) -> Amount {
    Amount::new(VALIDATOR_VOTE_ID_PRICE.raw().saturating_mul(count as u128))
}
