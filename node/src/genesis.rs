//! Genesis file: the validators and balances a chain starts from.

use serde::{Deserialize, Serialize};
use std::path::Path;

use tally_types::{Amount, Identity, NetworkParams, Validator};

use crate::NodeError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Hex-encoded identity.
    pub identity: String,
    pub power: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Hex-encoded identity.
    pub identity: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub allocations: Vec<GenesisAllocation>,
    #[serde(default)]
    pub network_params: NetworkParams,
}

impl GenesisConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, NodeError> {
        serde_json::from_str(s).map_err(|e| NodeError::Genesis(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, NodeError> {
        serde_json::to_string_pretty(self).map_err(|e| NodeError::Genesis(e.to_string()))
    }

    /// Decoded validators. Every power must be positive and every identity
    /// unique.
    pub fn validators(&self) -> Result<Vec<Validator>, NodeError> {
        let mut out: Vec<Validator> = Vec::with_capacity(self.validators.len());
        for v in &self.validators {
            let identity = decode_identity(&v.identity)?;
            if v.power <= 0 {
                return Err(NodeError::Genesis(format!(
                    "validator {} has non-positive power {}",
                    v.identity, v.power
                )));
            }
            if out.iter().any(|o| o.identity == identity) {
                return Err(NodeError::Genesis(format!("duplicate validator {}", v.identity)));
            }
            out.push(Validator {
                identity,
                power: v.power,
            });
        }
        Ok(out)
    }

    pub fn allocations(&self) -> Result<Vec<(Identity, Amount)>, NodeError> {
        self.allocations
            .iter()
            .map(|a| Ok((decode_identity(&a.identity)?, a.amount)))
            .collect()
    }
}

fn decode_identity(hex_id: &str) -> Result<Identity, NodeError> {
    hex_id
        .parse()
        .map_err(|_| NodeError::Genesis(format!("identity is not hex: {hex_id}")))
}
