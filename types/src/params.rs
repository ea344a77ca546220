//! Network parameters and the execution contexts handed to the router.

use serde::{Deserialize, Serialize};

use crate::Identity;

/// Default resolution lifetime for validator join/remove requests, in blocks.
pub const DEFAULT_JOIN_EXPIRY: i64 = 14_400;

/// Default cap on resolution IDs carried by one vote-ID transaction.
pub const DEFAULT_MAX_VOTES_PER_TX: usize = 200;

/// Where the network stands in a migration to a new chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    NoActiveMigration,
    /// A migration was approved and will start at a future height.
    ActivationPeriod,
    MigrationInProgress,
    MigrationCompleted,
}

impl MigrationStatus {
    /// Whether validator-set changes, votes and transfers are frozen.
    pub fn is_migrating(&self) -> bool {
        matches!(
            self,
            MigrationStatus::MigrationInProgress | MigrationStatus::MigrationCompleted
        )
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, MigrationStatus::NoActiveMigration)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// When set, transactions are free and no rewards are credited.
    #[serde(default)]
    pub disabled_gas_costs: bool,
    #[serde(default)]
    pub migration_status: MigrationStatus,
    /// Lifetime of validator join/remove resolutions, in blocks.
    #[serde(default = "default_join_expiry")]
    pub join_expiry: i64,
    /// Maximum resolution IDs per vote-ID transaction accepted by the mempool.
    #[serde(default = "default_max_votes_per_tx")]
    pub max_votes_per_tx: usize,
}

fn default_join_expiry() -> i64 {
    DEFAULT_JOIN_EXPIRY
}

fn default_max_votes_per_tx() -> usize {
    DEFAULT_MAX_VOTES_PER_TX
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            disabled_gas_costs: false,
            migration_status: MigrationStatus::NoActiveMigration,
            join_expiry: DEFAULT_JOIN_EXPIRY,
            max_votes_per_tx: DEFAULT_MAX_VOTES_PER_TX,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    pub chain_id: String,
    pub network_params: NetworkParams,
}

impl ChainContext {
    pub fn gas_enabled(&self) -> bool {
        !self.network_params.disabled_gas_costs
    }
}

/// The block currently being executed (or, for the mempool, the next block).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockContext {
    pub height: i64,
    /// Identity of the validator that proposed the block.
    pub proposer: Identity,
    pub chain: ChainContext,
}

impl BlockContext {
    pub fn params(&self) -> &NetworkParams {
        &self.chain.network_params
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxContext {
    pub block: BlockContext,
}

impl TxContext {
    pub fn new(block: BlockContext) -> Self {
        Self { block }
    }

    pub fn params(&self) -> &NetworkParams {
        self.block.params()
    }

    pub fn gas_enabled(&self) -> bool {
        self.block.chain.gas_enabled()
    }
}
