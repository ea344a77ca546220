//! Resolution voting engine.
//!
//! A *resolution type* is registered once at startup with its thresholds,
//! lifetime and resolve function. Instances of a type are proposed, collect
//! validator approvals, and are either finalized (confirmation threshold
//! reached) or expired by the executor at block end. The validator set that
//! weighs the votes lives here too, since resolving a membership resolution is
//! what changes it.

pub mod app;
pub mod builtin;
pub mod error;
pub mod events;
pub mod registry;
pub mod resolution;
pub mod store;
pub mod validators;

pub use app::App;
pub use builtin::{
    pending_migration, register_builtin_types, MigrationDeclaration, PendingMigration,
    UpdatePowerRequest, START_MIGRATION, VALIDATOR_JOIN, VALIDATOR_REMOVE,
};
pub use error::VotingError;
pub use events::EventStore;
pub use registry::{ResolutionConfig, ResolutionRegistry, ResolutionType, ResolveFn};
pub use resolution::Resolution;
pub use store::ResolutionStore;
pub use validators::ValidatorSet;
