//! Resolution types every node registers.
//!
//! `validator_join` and `validator_remove` change validator power and are
//! recurring: they are deleted when they finish but never marked processed,
//! so the same validator can join or be removed again later.
//! `start_migration` records an accepted migration proposal.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tally_store::{codec, ReadTxn};
use tally_types::{BlockContext, Identity};

use crate::{App, Resolution, ResolutionConfig, ResolutionRegistry, VotingError};

pub const VALIDATOR_JOIN: &str = "validator_join";
pub const VALIDATOR_REMOVE: &str = "validator_remove";
pub const START_MIGRATION: &str = "start_migration";

pub const MIGRATIONS_TABLE: &str = "migrations";
const PENDING_MIGRATION_KEY: &[u8] = b"pending";

/// Whether resolutions of this type skip processed-marking.
pub fn is_recurring(resolution_type: &str) -> bool {
    resolution_type.eq_ignore_ascii_case(VALIDATOR_JOIN)
        || resolution_type.eq_ignore_ascii_case(VALIDATOR_REMOVE)
}

/// Body of `validator_join` and `validator_remove` resolutions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePowerRequest {
    pub identity: Identity,
    pub power: i64,
}

impl UpdatePowerRequest {
    pub fn encode(&self) -> Result<Vec<u8>, VotingError> {
        Ok(codec::encode(self)?)
    }

    pub fn decode(body: &[u8]) -> Result<Self, VotingError> {
        codec::decode("update_power_request", body)
            .map_err(|e| VotingError::InvalidBody(e.to_string()))
    }
}

/// Body of a `start_migration` resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDeclaration {
    /// Blocks between approval and the start of the migration.
    pub activation_period: i64,
    /// Blocks the migration lasts once started.
    pub duration: i64,
}

impl MigrationDeclaration {
    pub fn encode(&self) -> Result<Vec<u8>, VotingError> {
        Ok(codec::encode(self)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    pub activation_height: i64,
    pub end_height: i64,
}

pub fn pending_migration(db: &dyn ReadTxn) -> Result<Option<PendingMigration>, VotingError> {
    match db.get(MIGRATIONS_TABLE, PENDING_MIGRATION_KEY)? {
        Some(bytes) => Ok(Some(codec::decode(MIGRATIONS_TABLE, &bytes)?)),
        None => Ok(None),
    }
}

fn resolve_power_update(
    app: &mut App<'_>,
    resolution: &Resolution,
    _block: &BlockContext,
) -> Result<(), VotingError> {
    let req = UpdatePowerRequest::decode(&resolution.body)?;
    tracing::info!(
        validator = %req.identity,
        power = req.power,
        resolution_type = %resolution.resolution_type,
        "applying validator power update"
    );
    app.validators.set_power(&mut *app.db, &req.identity, req.power)
}

fn resolve_start_migration(
    app: &mut App<'_>,
    resolution: &Resolution,
    block: &BlockContext,
) -> Result<(), VotingError> {
    let decl: MigrationDeclaration = codec::decode(START_MIGRATION, &resolution.body)
        .map_err(|e| VotingError::InvalidBody(e.to_string()))?;
    if decl.activation_period < 1 || decl.duration < 1 {
        return Err(VotingError::Rejected(format!(
            "migration periods must be positive: activation {}, duration {}",
            decl.activation_period, decl.duration
        )));
    }
    if pending_migration(app.db.as_read())?.is_some() {
        return Err(VotingError::Rejected("a migration is already pending".into()));
    }

    let overflow = || {
        VotingError::Rejected(format!(
            "migration periods overflow block height {}: activation {}, duration {}",
            block.height, decl.activation_period, decl.duration
        ))
    };
    let activation_height = block
        .height
        .checked_add(decl.activation_period)
        .ok_or_else(overflow)?;
    let pending = PendingMigration {
        activation_height,
        end_height: activation_height
            .checked_add(decl.duration)
            .ok_or_else(overflow)?,
    };
    app.db
        .put(MIGRATIONS_TABLE, PENDING_MIGRATION_KEY, &codec::encode(&pending)?)?;
    tracing::info!(
        activation_height,
        end_height = pending.end_height,
        "migration approved"
    );
    Ok(())
}

/// Register `validator_join`, `validator_remove` and `start_migration`.
/// Membership resolutions live for `join_expiry` blocks.
pub fn register_builtin_types(
    registry: &mut ResolutionRegistry,
    join_expiry: i64,
) -> Result<(), VotingError> {
    registry.register(
        VALIDATOR_JOIN,
        ResolutionConfig::new(Arc::new(resolve_power_update)).with_expiration_period(join_expiry),
    )?;
    registry.register(
        VALIDATOR_REMOVE,
        ResolutionConfig::new(Arc::new(resolve_power_update)).with_expiration_period(join_expiry),
    )?;
    registry.register(
        START_MIGRATION,
        ResolutionConfig::new(Arc::new(resolve_start_migration)),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventStore, ResolutionStore, ValidatorSet};
    use tally_ledger::AccountLedger;
    use tally_store::MemoryStore;
    use tally_types::ResolutionId;

    fn resolution(resolution_type: &str, body: Vec<u8>) -> Resolution {
        Resolution {
            id: ResolutionId::derive(resolution_type, &body),
            body,
            resolution_type: resolution_type.into(),
            expiration_height: 100,
            approved_power: 0,
            voters: Vec::new(),
            proposer: Identity::from("p"),
            double_proposer_vote: false,
        }
    }

    struct Fixture {
        registry: Arc<ResolutionRegistry>,
        db: MemoryStore,
        validators: ValidatorSet,
        accounts: AccountLedger,
        resolutions: ResolutionStore,
        events: EventStore,
        identity: Identity,
    }

    impl Fixture {
        fn new() -> Self {
            let mut reg = ResolutionRegistry::new();
            register_builtin_types(&mut reg, 50).unwrap();
            let registry = Arc::new(reg);
            let mut db = MemoryStore::new();
            let resolutions = ResolutionStore::open(&mut db, registry.clone()).unwrap();
            Self {
                events: EventStore::new(registry.clone()),
                registry,
                db,
                validators: ValidatorSet::new(),
                accounts: AccountLedger::new(),
                resolutions,
                identity: Identity::from("node"),
            }
        }

        fn resolve(&mut self, res: &Resolution, height: i64) -> Result<(), VotingError> {
            let ty = self.registry.get(&res.resolution_type)?.clone();
            let mut app = App {
                db: &mut self.db,
                accounts: &self.accounts,
                validators: &self.validators,
                resolutions: &self.resolutions,
                events: &self.events,
                identity: &self.identity,
            };
            let block = BlockContext {
                height,
                ..Default::default()
            };
            ty.resolve(&mut app, res, &block)
        }
    }

    #[test]
    fn membership_types_use_join_expiry() {
        let f = Fixture::new();
        assert_eq!(f.registry.get(VALIDATOR_JOIN).unwrap().expiration_period, 50);
        assert_eq!(f.registry.get(VALIDATOR_REMOVE).unwrap().expiration_period, 50);
        assert!(is_recurring("validator_join"));
        assert!(!is_recurring(START_MIGRATION));
    }

    #[test]
    fn join_sets_power_and_remove_clears_it() {
        let mut f = Fixture::new();
        let who = Identity::from("candidate");
        let join = UpdatePowerRequest {
            identity: who.clone(),
            power: 7,
        };
        f.resolve(&resolution(VALIDATOR_JOIN, join.encode().unwrap()), 1)
            .unwrap();
        f.validators.commit(&f.db).unwrap();
        assert_eq!(f.validators.get_power(&who), 7);

        let remove = UpdatePowerRequest {
            identity: who.clone(),
            power: 0,
        };
        f.resolve(&resolution(VALIDATOR_REMOVE, remove.encode().unwrap()), 2)
            .unwrap();
        f.validators.commit(&f.db).unwrap();
        assert_eq!(f.validators.get_power(&who), 0);
    }

    #[test]
    fn garbage_body_is_rejected() {
        let mut f = Fixture::new();
        assert!(matches!(
            f.resolve(&resolution(VALIDATOR_JOIN, vec![1]), 1),
            Err(VotingError::InvalidBody(_))
        ));
    }

    #[test]
    fn migration_is_recorded_once() {
        let mut f = Fixture::new();
        let decl = MigrationDeclaration {
            activation_period: 10,
            duration: 20,
        };
        let res = resolution(START_MIGRATION, decl.encode().unwrap());
        f.resolve(&res, 5).unwrap();
        assert_eq!(
            pending_migration(&f.db).unwrap(),
            Some(PendingMigration {
                activation_height: 15,
                end_height: 35
            })
        );
        assert!(matches!(f.resolve(&res, 6), Err(VotingError::Rejected(_))));
    }

    #[test]
    fn migration_periods_past_max_height_are_rejected() {
        let mut f = Fixture::new();
        for (activation_period, duration) in [(i64::MAX, 1), (1, i64::MAX - 5)] {
            let decl = MigrationDeclaration {
                activation_period,
                duration,
            };
            let res = resolution(START_MIGRATION, decl.encode().unwrap());
            assert!(matches!(f.resolve(&res, 10), Err(VotingError::Rejected(_))));
        }
        assert_eq!(pending_migration(&f.db).unwrap(), None);
    }
}
