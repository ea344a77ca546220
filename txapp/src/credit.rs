//! Voting rewards accumulated during finalize.

use std::collections::BTreeMap;

use tally_ledger::{Accounts, LedgerError};
use tally_store::WriteTxn;
use tally_types::{Amount, Identity};
use tally_voting::Resolution;

use crate::pricing::{body_price, VALIDATOR_VOTE_ID_PRICE};

/// Rewards owed per identity. Keys iterate in byte order, so applying the
/// map never depends on the order in which rewards were accumulated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreditMap(BTreeMap<Identity, Amount>);

impl CreditMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &Identity, amount: Amount) {
        let entry = self.0.entry(id.clone()).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Reward every voter except the proposer a flat vote price, and the
    /// proposer in proportion to the body it submitted.
    pub fn apply_resolution(&mut self, resolution: &Resolution) {
        for voter in &resolution.voters {
            if voter.identity == resolution.proposer {
                continue;
            }
            self.add(&voter.identity, VALIDATOR_VOTE_ID_PRICE);
        }
        self.add(&resolution.proposer, body_price(resolution.body.len()));
    }

    pub fn get(&self, id: &Identity) -> Amount {
        self.0.get(id).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Amount {
        self.0
            .values()
            .fold(Amount::ZERO, |acc, a| acc.saturating_add(*a))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Amount)> {
        self.0.iter()
    }

    /// Credit every recipient, in key order.
    pub fn apply(&self, accounts: &dyn Accounts, db: &mut dyn WriteTxn) -> Result<(), LedgerError> {
        for (id, amount) in &self.0 {
            accounts.credit(db, id, *amount)?;
            tracing::debug!(account = %id, %amount, "credited voting reward");
        }
        Ok(())
    }
}
