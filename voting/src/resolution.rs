//! A resolution as returned by store queries.

use tally_types::{Identity, ResolutionId, Validator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub id: ResolutionId,
    pub body: Vec<u8>,
    pub resolution_type: String,
    /// Height at or after which the resolution is expired if not finalized.
    pub expiration_height: i64,
    /// Sum of the current power of every voter.
    pub approved_power: i64,
    /// Voters that are still validators, with their current power.
    pub voters: Vec<Validator>,
    /// Whoever submitted the body. Not necessarily a voter.
    pub proposer: Identity,
    /// Set when the proposer also cast a vote on the resolution.
    pub double_proposer_vote: bool,
}

impl Resolution {
    pub fn has_voted(&self, identity: &Identity) -> bool {
        self.voters.iter().any(|v| &v.identity == identity)
    }
}
