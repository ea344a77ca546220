//! Content-addressed resolution identifiers.
//!
//! A resolution's ID is derived from its `(type, body)` pair, so two nodes
//! that independently observe the same fact propose the same ID.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b128 = Blake2b<U16>;

/// A 16-byte resolution identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolutionId([u8; 16]);

impl ResolutionId {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derive the ID for an event of `event_type` carrying `body`.
    ///
    /// Type names are case-insensitive, so the type is hashed lowercased.
    /// It is length-prefixed so that `("ab", "c")` and `("a", "bc")` never
    /// collide.
    pub fn derive(event_type: &str, body: &[u8]) -> Self {
        let event_type = event_type.to_lowercase();
        let mut hasher = Blake2b128::new();
        hasher.update((event_type.len() as u64).to_be_bytes());
        hasher.update(event_type.as_bytes());
        hasher.update(body);
        let mut out = [0u8; 16];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Name-based ID for a bare string, e.g. a resolution type name.
    pub fn for_name(name: &str) -> Self {
        Self::derive("", name.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for ResolutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolutionId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
