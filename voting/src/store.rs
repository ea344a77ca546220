//! Resolution bookkeeping.
//!
//! Tables:
//! - `resolutions`: resolution ID -> type, body, expiration, proposer, voters
//! - `processed`: IDs that reached a terminal state and may not be recreated
//! - `resolution_types`: every type name this database has ever seen
//!
//! Approved power is never stored. It is computed on read from the voters'
//! current entries in the `voters` table, so a validator that leaves stops
//! counting towards every resolution it voted on.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tally_store::{codec, ReadTxn, StoreError, WriteTxn};
use tally_types::{required_power, Identity, ResolutionId, Threshold, Validator, VotableEvent};

use crate::validators::stored_power;
use crate::{Resolution, ResolutionRegistry, VotingError};

pub const RESOLUTIONS_TABLE: &str = "resolutions";
pub const PROCESSED_TABLE: &str = "processed";
pub const RESOLUTION_TYPES_TABLE: &str = "resolution_types";

#[derive(Serialize, Deserialize)]
struct ResolutionRow {
    resolution_type: String,
    body: Vec<u8>,
    expiration_height: i64,
    proposer: Identity,
    /// In voting order, without duplicates.
    voters: Vec<Identity>,
}

fn id_from_key(table: &str, key: &[u8]) -> Result<ResolutionId, StoreError> {
    let bytes: [u8; 16] = key
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("{table}: bad key length {}", key.len())))?;
    Ok(ResolutionId::new(bytes))
}

pub(crate) fn resolution_exists(db: &dyn ReadTxn, id: &ResolutionId) -> Result<bool, VotingError> {
    Ok(db.contains(RESOLUTIONS_TABLE, id.as_bytes())?)
}

pub(crate) fn processed(db: &dyn ReadTxn, id: &ResolutionId) -> Result<bool, VotingError> {
    Ok(db.contains(PROCESSED_TABLE, id.as_bytes())?)
}

pub struct ResolutionStore {
    registry: Arc<ResolutionRegistry>,
}

impl ResolutionStore {
    /// Check persisted resolution types against the registry and record any
    /// newly registered ones. A persisted type the registry no longer knows
    /// means historical data cannot be interpreted, so opening fails.
    pub fn open(
        db: &mut dyn WriteTxn,
        registry: Arc<ResolutionRegistry>,
    ) -> Result<Self, VotingError> {
        for (key, _) in db.scan(RESOLUTION_TYPES_TABLE)? {
            let name = String::from_utf8(key).map_err(|e| {
                StoreError::Corruption(format!("{RESOLUTION_TYPES_TABLE}: {e}"))
            })?;
            if !registry.contains(&name) {
                return Err(VotingError::UnregisteredPersistedType(name));
            }
        }

        for name in registry.list() {
            if db.contains(RESOLUTION_TYPES_TABLE, name.as_bytes())? {
                continue;
            }
            tracing::info!(name = %name, "creating resolution type");
            let type_id = ResolutionId::for_name(&name);
            db.put(RESOLUTION_TYPES_TABLE, name.as_bytes(), type_id.as_bytes())?;
        }

        Ok(Self { registry })
    }

    pub fn registry(&self) -> &ResolutionRegistry {
        &self.registry
    }

    /// Create a resolution for `event`. The proposer is recorded but does
    /// not vote; callers approve separately when the proposer is a voter.
    pub fn create(
        &self,
        db: &mut dyn WriteTxn,
        event: &VotableEvent,
        expiration_height: i64,
        proposer: &Identity,
    ) -> Result<ResolutionId, VotingError> {
        let resolution_type = self.registry.get(&event.event_type)?.name.clone();
        let id = event.id();

        if resolution_exists(db.as_read(), &id)? {
            return Err(VotingError::ResolutionExists(id));
        }
        if processed(db.as_read(), &id)? {
            return Err(VotingError::ResolutionProcessed(id));
        }

        let row = ResolutionRow {
            resolution_type,
            body: event.body.clone(),
            expiration_height,
            proposer: proposer.clone(),
            voters: Vec::new(),
        };
        db.put(RESOLUTIONS_TABLE, id.as_bytes(), &codec::encode(&row)?)?;
        tracing::debug!(%id, resolution_type = %row.resolution_type, expiration_height, "created resolution");
        Ok(id)
    }

    /// Record `voter`'s approval. Repeat approvals are no-ops.
    pub fn approve(
        &self,
        db: &mut dyn WriteTxn,
        id: &ResolutionId,
        voter: &Identity,
    ) -> Result<(), VotingError> {
        let mut row = load_row(db.as_read(), id)?.ok_or(VotingError::ResolutionNotFound(*id))?;

        if stored_power(db.as_read(), voter)? <= 0 {
            return Err(VotingError::UnknownVoter(voter.clone()));
        }
        if row.voters.contains(voter) {
            return Ok(());
        }

        row.voters.push(voter.clone());
        db.put(RESOLUTIONS_TABLE, id.as_bytes(), &codec::encode(&row)?)?;
        tracing::debug!(%id, voter = %voter, "approved resolution");
        Ok(())
    }

    pub fn delete(&self, db: &mut dyn WriteTxn, ids: &[ResolutionId]) -> Result<(), VotingError> {
        for id in ids {
            db.delete(RESOLUTIONS_TABLE, id.as_bytes())?;
        }
        Ok(())
    }

    pub fn mark_processed(
        &self,
        db: &mut dyn WriteTxn,
        ids: &[ResolutionId],
    ) -> Result<(), VotingError> {
        for id in ids {
            db.put(PROCESSED_TABLE, id.as_bytes(), &[])?;
        }
        Ok(())
    }

    pub fn exists(&self, db: &dyn ReadTxn, id: &ResolutionId) -> Result<bool, VotingError> {
        resolution_exists(db, id)
    }

    pub fn is_processed(&self, db: &dyn ReadTxn, id: &ResolutionId) -> Result<bool, VotingError> {
        processed(db, id)
    }

    /// IDs not marked processed, in input order. Unknown IDs count as not
    /// processed.
    pub fn filter_not_processed(
        &self,
        db: &dyn ReadTxn,
        ids: &[ResolutionId],
    ) -> Result<Vec<ResolutionId>, VotingError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if !processed(db, id)? {
                out.push(*id);
            }
        }
        Ok(out)
    }

    pub fn info(&self, db: &dyn ReadTxn, id: &ResolutionId) -> Result<Option<Resolution>, VotingError> {
        load_row(db, id)?
            .map(|row| hydrate(db, *id, row))
            .transpose()
    }

    pub fn by_type(&self, db: &dyn ReadTxn, resolution_type: &str) -> Result<Vec<Resolution>, VotingError> {
        let wanted = resolution_type.to_lowercase();
        scan_rows(db)?
            .into_iter()
            .filter(|(_, row)| row.resolution_type == wanted)
            .map(|(id, row)| hydrate(db, id, row))
            .collect()
    }

    pub fn ids_by_type_and_proposer(
        &self,
        db: &dyn ReadTxn,
        resolution_type: &str,
        proposer: &Identity,
    ) -> Result<Vec<ResolutionId>, VotingError> {
        let wanted = resolution_type.to_lowercase();
        Ok(scan_rows(db)?
            .into_iter()
            .filter(|(_, row)| row.resolution_type == wanted && &row.proposer == proposer)
            .map(|(id, _)| id)
            .collect())
    }

    /// Resolutions of `resolution_type` whose approved power reaches
    /// `threshold` of `total_power`, in ID order.
    pub fn by_threshold_and_type(
        &self,
        db: &dyn ReadTxn,
        threshold: Threshold,
        resolution_type: &str,
        total_power: i64,
    ) -> Result<Vec<Resolution>, VotingError> {
        let required = required_power(threshold, total_power);
        Ok(self
            .by_type(db, resolution_type)?
            .into_iter()
            .filter(|r| r.approved_power >= required)
            .collect())
    }

    /// Resolutions with `expiration_height <= height`, in ID order.
    pub fn expired(&self, db: &dyn ReadTxn, height: i64) -> Result<Vec<Resolution>, VotingError> {
        scan_rows(db)?
            .into_iter()
            .filter(|(_, row)| row.expiration_height <= height)
            .map(|(id, row)| hydrate(db, id, row))
            .collect()
    }
}

fn load_row(db: &dyn ReadTxn, id: &ResolutionId) -> Result<Option<ResolutionRow>, VotingError> {
    match db.get(RESOLUTIONS_TABLE, id.as_bytes())? {
        Some(bytes) => Ok(Some(codec::decode(RESOLUTIONS_TABLE, &bytes)?)),
        None => Ok(None),
    }
}

fn scan_rows(db: &dyn ReadTxn) -> Result<Vec<(ResolutionId, ResolutionRow)>, VotingError> {
    let mut rows = Vec::new();
    for (key, value) in db.scan(RESOLUTIONS_TABLE)? {
        let id = id_from_key(RESOLUTIONS_TABLE, &key)?;
        rows.push((id, codec::decode(RESOLUTIONS_TABLE, &value)?));
    }
    Ok(rows)
}

fn hydrate(db: &dyn ReadTxn, id: ResolutionId, row: ResolutionRow) -> Result<Resolution, VotingError> {
    let mut voters = Vec::with_capacity(row.voters.len());
    let mut approved_power = 0i64;
    for identity in row.voters {
        let power = stored_power(db, &identity)?;
        if power > 0 {
            approved_power = approved_power.saturating_add(power);
            voters.push(Validator { identity, power });
        }
    }

    let double_proposer_vote = voters.iter().any(|v| v.identity == row.proposer);
    Ok(Resolution {
        id,
        body: row.body,
        resolution_type: row.resolution_type,
        expiration_height: row.expiration_height,
        approved_power,
        voters,
        proposer: row.proposer,
        double_proposer_vote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResolutionConfig, ValidatorSet};
    use tally_store::MemoryStore;

    const TEST_TYPE: &str = "test_type";

    fn registry() -> Arc<ResolutionRegistry> {
        let mut reg = ResolutionRegistry::new();
        reg.register(TEST_TYPE, ResolutionConfig::new(Arc::new(|_, _, _| Ok(()))))
            .unwrap();
        Arc::new(reg)
    }

    /// Store with validators "a" and "b" at power 100 each.
    fn setup() -> (ResolutionStore, MemoryStore) {
        let mut db = MemoryStore::new();
        let validators = ValidatorSet::new();
        validators.set_power(&mut db, &Identity::from("a"), 100).unwrap();
        validators.set_power(&mut db, &Identity::from("b"), 100).unwrap();
        let store = ResolutionStore::open(&mut db, registry()).unwrap();
        (store, db)
    }

    fn event(body: &str) -> VotableEvent {
        VotableEvent::new(TEST_TYPE, body.as_bytes())
    }

    #[test]
    fn threshold_query_requires_two_thirds() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("hello"), 10, &a).unwrap();
        store.approve(&mut db, &id, &a).unwrap();

        let found = store
            .by_threshold_and_type(&db, Threshold::TWO_THIRDS, TEST_TYPE, 200)
            .unwrap();
        assert!(found.is_empty());

        store.approve(&mut db, &id, &Identity::from("b")).unwrap();
        let found = store
            .by_threshold_and_type(&db, Threshold::TWO_THIRDS, TEST_TYPE, 200)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].approved_power, 200);
        assert!(found[0].double_proposer_vote);
    }

    #[test]
    fn duplicate_create_fails() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        store.create(&mut db, &event("x"), 10, &a).unwrap();
        assert!(matches!(
            store.create(&mut db, &event("x"), 10, &a),
            Err(VotingError::ResolutionExists(_))
        ));
    }

    #[test]
    fn processed_resolution_cannot_be_recreated() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        store.delete(&mut db, &[id]).unwrap();
        store.mark_processed(&mut db, &[id]).unwrap();
        assert!(matches!(
            store.create(&mut db, &event("x"), 10, &a),
            Err(VotingError::ResolutionProcessed(_))
        ));
    }

    #[test]
    fn processed_resolution_cannot_be_recreated_under_another_case() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        store.delete(&mut db, &[id]).unwrap();
        store.mark_processed(&mut db, &[id]).unwrap();

        let shouted = VotableEvent::new(TEST_TYPE.to_uppercase(), b"x".to_vec());
        assert_eq!(shouted.id(), id);
        assert!(matches!(
            store.create(&mut db, &shouted, 10, &a),
            Err(VotingError::ResolutionProcessed(_))
        ));
    }

    #[test]
    fn deleted_but_unprocessed_resolution_can_be_recreated() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        store.delete(&mut db, &[id]).unwrap();
        assert!(!store.exists(&db, &id).unwrap());
        store.create(&mut db, &event("x"), 20, &a).unwrap();
    }

    #[test]
    fn repeat_approval_is_idempotent() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        store.approve(&mut db, &id, &a).unwrap();
        store.approve(&mut db, &id, &a).unwrap();
        assert_eq!(store.info(&db, &id).unwrap().unwrap().approved_power, 100);
    }

    #[test]
    fn approval_checks_voter_and_existence() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        assert!(matches!(
            store.approve(&mut db, &id, &Identity::from("mallory")),
            Err(VotingError::UnknownVoter(_))
        ));
        let missing = event("nope").id();
        assert!(matches!(
            store.approve(&mut db, &missing, &a),
            Err(VotingError::ResolutionNotFound(_))
        ));
    }

    #[test]
    fn unknown_type_cannot_be_created() {
        let (store, mut db) = setup();
        let err = store
            .create(&mut db, &VotableEvent::new("other", b"x".to_vec()), 10, &Identity::from("a"))
            .unwrap_err();
        assert!(matches!(err, VotingError::UnknownResolutionType(_)));
    }

    #[test]
    fn expired_is_inclusive_of_height() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let early = store.create(&mut db, &event("early"), 5, &a).unwrap();
        store.create(&mut db, &event("late"), 6, &a).unwrap();
        let expired = store.expired(&db, 5).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, early);
    }

    #[test]
    fn filter_not_processed_keeps_unknown_ids() {
        let (store, mut db) = setup();
        let done = event("done").id();
        let unknown = event("unknown").id();
        store.mark_processed(&mut db, &[done]).unwrap();
        assert_eq!(
            store.filter_not_processed(&db, &[done, unknown]).unwrap(),
            vec![unknown]
        );
        assert!(store.is_processed(&db, &done).unwrap());
    }

    #[test]
    fn lookup_by_proposer() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let b = Identity::from("b");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        store.create(&mut db, &event("y"), 10, &b).unwrap();
        assert_eq!(store.ids_by_type_and_proposer(&db, TEST_TYPE, &a).unwrap(), vec![id]);
        assert_eq!(store.by_type(&db, TEST_TYPE).unwrap().len(), 2);
    }

    #[test]
    fn open_rejects_unregistered_persisted_type() {
        let (_, mut db) = setup();
        let empty = Arc::new(ResolutionRegistry::new());
        assert!(matches!(
            ResolutionStore::open(&mut db, empty),
            Err(VotingError::UnregisteredPersistedType(name)) if name == TEST_TYPE
        ));
    }

    #[test]
    fn departed_voter_stops_counting() {
        let (store, mut db) = setup();
        let a = Identity::from("a");
        let id = store.create(&mut db, &event("x"), 10, &a).unwrap();
        store.approve(&mut db, &id, &a).unwrap();
        ValidatorSet::new().set_power(&mut db, &a, 0).unwrap();
        let info = store.info(&db, &id).unwrap().unwrap();
        assert_eq!(info.approved_power, 0);
        assert!(info.voters.is_empty());
    }
}
