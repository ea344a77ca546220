//! Registered resolution types.
//!
//! The registry is built once at startup, then shared read-only (behind an
//! `Arc`) with the resolution store and the executor. Names are matched
//! case-insensitively and stored lowercase.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tally_types::{BlockContext, Threshold, DEFAULT_JOIN_EXPIRY};

use crate::{App, Resolution, VotingError};

/// Applies a confirmed resolution. Runs inside its own nested transaction;
/// returning an error rolls back only that transaction.
pub type ResolveFn =
    Arc<dyn Fn(&mut App<'_>, &Resolution, &BlockContext) -> Result<(), VotingError> + Send + Sync>;

/// Policy supplied at registration. Unset fields take the defaults: 2/3 to
/// confirm, 1/1 to refund on expiry, and a lifetime of 14 400 blocks.
#[derive(Clone)]
pub struct ResolutionConfig {
    pub confirmation_threshold: Option<Threshold>,
    pub refund_threshold: Option<Threshold>,
    pub expiration_period: Option<i64>,
    pub resolve: ResolveFn,
}

impl ResolutionConfig {
    pub fn new(resolve: ResolveFn) -> Self {
        Self {
            confirmation_threshold: None,
            refund_threshold: None,
            expiration_period: None,
            resolve,
        }
    }

    pub fn with_confirmation_threshold(mut self, threshold: Threshold) -> Self {
        self.confirmation_threshold = Some(threshold);
        self
    }

    pub fn with_refund_threshold(mut self, threshold: Threshold) -> Self {
        self.refund_threshold = Some(threshold);
        self
    }

    pub fn with_expiration_period(mut self, blocks: i64) -> Self {
        self.expiration_period = Some(blocks);
        self
    }
}

/// A registered type with every default filled in.
#[derive(Clone)]
pub struct ResolutionType {
    pub name: String,
    pub confirmation_threshold: Threshold,
    pub refund_threshold: Threshold,
    pub expiration_period: i64,
    resolve: ResolveFn,
}

impl ResolutionType {
    pub fn resolve(
        &self,
        app: &mut App<'_>,
        resolution: &Resolution,
        block: &BlockContext,
    ) -> Result<(), VotingError> {
        (self.resolve)(app, resolution, block)
    }
}

impl fmt::Debug for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionType")
            .field("name", &self.name)
            .field("confirmation_threshold", &self.confirmation_threshold)
            .field("refund_threshold", &self.refund_threshold)
            .field("expiration_period", &self.expiration_period)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ResolutionRegistry {
    types: BTreeMap<String, ResolutionType>,
}

impl ResolutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, config: ResolutionConfig) -> Result<(), VotingError> {
        let key = name.to_lowercase();
        if self.types.contains_key(&key) {
            return Err(VotingError::DuplicateResolutionType(key));
        }

        let expiration_period = match config.expiration_period {
            Some(p) if p > 0 => p,
            _ => DEFAULT_JOIN_EXPIRY,
        };

        tracing::debug!(name = %key, "registered resolution type");
        self.types.insert(
            key.clone(),
            ResolutionType {
                name: key,
                confirmation_threshold: config
                    .confirmation_threshold
                    .unwrap_or(Threshold::TWO_THIRDS),
                refund_threshold: config.refund_threshold.unwrap_or(Threshold::ONE),
                expiration_period,
                resolve: config.resolve,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ResolutionType, VotingError> {
        self.types
            .get(&name.to_lowercase())
            .ok_or_else(|| VotingError::UnknownResolutionType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(&name.to_lowercase())
    }

    /// Registered names in lexicographic order.
    pub fn list(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}
