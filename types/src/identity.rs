//! Opaque account / validator identity.
//!
//! Identities are arbitrary byte strings (typically a public key). They are
//! ordered bytewise, which is the canonical order used wherever the core needs
//! a deterministic iteration over identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Identity(Vec<u8>);

impl Identity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<&[u8]> for Identity {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl FromStr for Identity {
    type Err = TypesError;

    /// Parse a hex-encoded identity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s)
            .map(Self)
            .map_err(|_| TypesError::InvalidIdentity(s.to_string()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
