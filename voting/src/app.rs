//! Handles passed to resolve functions and transaction routes.

use tally_ledger::Accounts;
use tally_store::WriteTxn;
use tally_types::Identity;

use crate::{EventStore, ResolutionStore, ValidatorSet};

/// Everything a route or resolve function may touch, scoped to one nested
/// transaction.
pub struct App<'a> {
    pub db: &'a mut dyn WriteTxn,
    pub accounts: &'a dyn Accounts,
    pub validators: &'a ValidatorSet,
    pub resolutions: &'a ResolutionStore,
    pub events: &'a EventStore,
    /// Identity of the local node.
    pub identity: &'a Identity,
}

impl App<'_> {
    pub fn is_local(&self, identity: &Identity) -> bool {
        self.identity == identity
    }
}
