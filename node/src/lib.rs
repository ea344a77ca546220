//! tally node: wires the execution core to configuration, genesis and a
//! block driver.
//!
//! The node is the coordinator that:
//! - Loads its configuration (TOML) and genesis file (JSON)
//! - Seeds the initial validator set and balances
//! - Admits transactions into the mempool
//! - Drives each block through `begin`, `execute`, `finalize` and `commit`
//! - Queues unvoted resolutions for rebroadcast
//! - Publishes validator set changes to subscribers

pub mod config;
pub mod error;
pub mod genesis;
pub mod logging;
pub mod node;
pub mod rebroadcast;

pub use config::NodeConfig;
pub use error::NodeError;
pub use genesis::{GenesisAllocation, GenesisConfig, GenesisValidator};
pub use logging::{init_logging, LogFormat};
pub use node::{BlockResult, Node};
pub use rebroadcast::RebroadcastQueue;
