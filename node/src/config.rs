//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tally_types::{Identity, DEFAULT_JOIN_EXPIRY, DEFAULT_MAX_VOTES_PER_TX};

use crate::{LogFormat, NodeError};

/// Configuration for a tally node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chain the node executes blocks for.
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Hex-encoded identity of the local validator.
    #[serde(default)]
    pub identity: String,

    /// Genesis file (JSON). Only read when the state is empty.
    #[serde(default)]
    pub genesis_file: Option<PathBuf>,

    /// State snapshot written after every committed block when set, and
    /// loaded at startup if it exists.
    #[serde(default)]
    pub snapshot_file: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Cap on resolution IDs in one vote-ID transaction.
    #[serde(default = "default_max_votes_per_tx")]
    pub max_votes_per_tx: usize,

    /// Lifetime of validator join and remove requests, in blocks.
    #[serde(default = "default_join_expiry")]
    pub join_expiry: i64,

    /// Run without transaction fees or voting rewards.
    #[serde(default)]
    pub disable_gas_costs: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_chain_id() -> String {
    "tally-dev".to_string()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_votes_per_tx() -> usize {
    DEFAULT_MAX_VOTES_PER_TX
}

fn default_join_expiry() -> i64 {
    DEFAULT_JOIN_EXPIRY
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// The local identity, decoded from hex.
    pub fn identity(&self) -> Result<Identity, NodeError> {
        if self.identity.is_empty() {
            return Err(NodeError::Config("identity is not set".into()));
        }
        self.identity
            .parse()
            .map_err(|_| NodeError::Config(format!("identity is not hex: {}", self.identity)))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            identity: String::new(),
            genesis_file: None,
            snapshot_file: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            max_votes_per_tx: default_max_votes_per_tx(),
            join_expiry: default_join_expiry(),
            disable_gas_costs: false,
        }
    }
}
