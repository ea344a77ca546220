//! Validator identity and voting power.

use serde::{Deserialize, Serialize};

use crate::Identity;

/// A validator and its voting power. Power 0 is equivalent to absence from
/// the set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub identity: Identity,
    pub power: i64,
}

impl Validator {
    pub fn new(identity: impl Into<Identity>, power: i64) -> Self {
        Self {
            identity: identity.into(),
            power,
        }
    }
}

/// Sum of power over a validator list.
pub fn total_power(validators: &[Validator]) -> i64 {
    validators.iter().map(|v| v.power).sum()
}
