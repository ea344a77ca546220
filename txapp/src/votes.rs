//! Block-end processing of confirmed and expired resolutions.

use std::collections::BTreeSet;

use tally_ledger::Accounts;
use tally_store::{Savepoint, WriteTxn};
use tally_types::{required_power, BlockContext, Identity, ResolutionId};
use tally_voting::builtin::is_recurring;
use tally_voting::{
    App, EventStore, Resolution, ResolutionStore, UpdatePowerRequest, ValidatorSet,
    VALIDATOR_JOIN,
};

use crate::{CreditMap, TxAppError};

pub(crate) struct VoteProcessor<'a> {
    pub accounts: &'a dyn Accounts,
    pub validators: &'a ValidatorSet,
    pub resolutions: &'a ResolutionStore,
    pub events: &'a EventStore,
    pub identity: &'a Identity,
}

impl VoteProcessor<'_> {
    /// Apply confirmed resolutions, expire stale ones and pay voters.
    /// Returns the candidates whose join requests expired.
    pub fn process_votes(
        &self,
        db: &mut dyn WriteTxn,
        block: &BlockContext,
    ) -> Result<Vec<Identity>, TxAppError> {
        let registry = self.resolutions.registry();
        let total_power = self.validators.total_power();

        let mut credits = CreditMap::new();
        let mut finalized: Vec<Resolution> = Vec::new();
        let mut processed_ids: Vec<ResolutionId> = Vec::new();

        for name in registry.list() {
            let ty = registry.get(&name)?;
            let confirmed = self.resolutions.by_threshold_and_type(
                db.as_read(),
                ty.confirmation_threshold,
                &name,
                total_power,
            )?;
            for resolution in confirmed {
                credits.apply_resolution(&resolution);
                if !is_recurring(&resolution.resolution_type) {
                    processed_ids.push(resolution.id);
                }
                finalized.push(resolution);
            }
        }

        // Resolve only after every type is scanned so that power changes
        // made here never affect which resolutions confirm this block.
        for resolution in &finalized {
            self.resolve(db, resolution, block)?;
        }

        let finalized_ids: BTreeSet<ResolutionId> = finalized.iter().map(|r| r.id).collect();
        let mut expired_ids = Vec::new();
        let mut expired_joins = Vec::new();

        for resolution in self.resolutions.expired(db.as_read(), block.height)? {
            if finalized_ids.contains(&resolution.id) {
                continue;
            }
            let ty = registry.get(&resolution.resolution_type)?;
            let refunded =
                resolution.approved_power >= required_power(ty.refund_threshold, total_power);
            if refunded {
                credits.apply_resolution(&resolution);
            }
            if !is_recurring(&resolution.resolution_type) {
                processed_ids.push(resolution.id);
            }
            if resolution.resolution_type == VALIDATOR_JOIN {
                let request = UpdatePowerRequest::decode(&resolution.body)
                    .map_err(|e| TxAppError::Internal(format!("join {}: {e}", resolution.id)))?;
                expired_joins.push(request.identity);
            }
            tracing::info!(
                id = %resolution.id,
                resolution_type = %resolution.resolution_type,
                approved_power = resolution.approved_power,
                refunded,
                "expiring resolution"
            );
            expired_ids.push(resolution.id);
        }

        let mut deleted: Vec<ResolutionId> = finalized_ids.into_iter().collect();
        deleted.extend(expired_ids);
        self.resolutions.delete(db, &deleted)?;
        self.resolutions.mark_processed(db, &processed_ids)?;
        self.events.delete_events(db, &processed_ids)?;

        if block.chain.gas_enabled() {
            credits.apply(self.accounts, db)?;
        }

        tracing::debug!(
            height = block.height,
            finalized = finalized.len(),
            removed = deleted.len(),
            credited = %credits.total(),
            "processed votes"
        );
        Ok(expired_joins)
    }

    /// Run one resolve function in its own savepoint. A failure is the
    /// resolution's business and only rolls back its own writes.
    fn resolve(
        &self,
        db: &mut dyn WriteTxn,
        resolution: &Resolution,
        block: &BlockContext,
    ) -> Result<(), TxAppError> {
        let ty = self.resolutions.registry().get(&resolution.resolution_type)?;
        tracing::debug!(id = %resolution.id, resolution_type = %ty.name, "resolving resolution");

        let mut savepoint = Savepoint::begin(db)?;
        let mut app = App {
            db: &mut savepoint,
            accounts: self.accounts,
            validators: self.validators,
            resolutions: self.resolutions,
            events: self.events,
            identity: self.identity,
        };
        match ty.resolve(&mut app, resolution, block) {
            Ok(()) => savepoint.commit()?,
            Err(e) => {
                savepoint.rollback()?;
                tracing::warn!(
                    id = %resolution.id,
                    resolution_type = %ty.name,
                    error = %e,
                    "error resolving resolution"
                );
            }
        }
        Ok(())
    }
}
