//! Committed validator powers and this block's staged changes.
//!
//! `set_power` writes the `voters` table of the caller's transaction and
//! remembers which identities were touched. Reads through [`ValidatorSet`]
//! see only the committed view, so every transaction in a block is judged
//! against the same power table. At commit the touched identities are
//! re-read from the block's final state, which means writes discarded by a
//! rolled-back savepoint never reach the committed view.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use tally_store::{codec, ReadTxn, WriteTxn};
use tally_types::{Identity, Validator};
use tokio::sync::broadcast;

use crate::VotingError;

pub const VOTERS_TABLE: &str = "voters";

const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Power recorded for `identity` in the given transaction view; 0 if absent.
pub fn stored_power(db: &dyn ReadTxn, identity: &Identity) -> Result<i64, VotingError> {
    match db.get(VOTERS_TABLE, identity.as_bytes())? {
        Some(bytes) => Ok(codec::decode(VOTERS_TABLE, &bytes)?),
        None => Ok(0),
    }
}

#[derive(Default)]
struct ValidatorState {
    committed: BTreeMap<Identity, i64>,
    pending: BTreeSet<Identity>,
}

pub struct ValidatorSet {
    state: Mutex<ValidatorState>,
    updates: broadcast::Sender<Vec<Validator>>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorSet {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ValidatorState::default()),
            updates,
        }
    }

    /// Build the committed view from the persisted `voters` table.
    pub fn load(db: &dyn ReadTxn) -> Result<Self, VotingError> {
        let set = Self::new();
        {
            let mut state = set.lock();
            for (key, value) in db.scan(VOTERS_TABLE)? {
                let power: i64 = codec::decode(VOTERS_TABLE, &value)?;
                if power > 0 {
                    state.committed.insert(Identity::new(key), power);
                }
            }
            tracing::debug!(validators = state.committed.len(), "loaded validator set");
        }
        Ok(set)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ValidatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stage a power change. Power 0 removes the validator once committed.
    pub fn set_power(
        &self,
        db: &mut dyn WriteTxn,
        identity: &Identity,
        power: i64,
    ) -> Result<(), VotingError> {
        if power < 0 {
            return Err(VotingError::NegativePower {
                identity: identity.clone(),
                power,
            });
        }

        if power == 0 {
            db.delete(VOTERS_TABLE, identity.as_bytes())?;
        } else {
            db.put(VOTERS_TABLE, identity.as_bytes(), &codec::encode(&power)?)?;
        }

        self.lock().pending.insert(identity.clone());
        tracing::debug!(validator = %identity, power, "staged validator power");
        Ok(())
    }

    /// Committed power; 0 for identities outside the set.
    pub fn get_power(&self, identity: &Identity) -> i64 {
        self.lock().committed.get(identity).copied().unwrap_or(0)
    }

    pub fn is_validator(&self, identity: &Identity) -> bool {
        self.get_power(identity) > 0
    }

    /// Snapshot of the committed set, ordered by identity.
    pub fn get_validators(&self) -> Vec<Validator> {
        self.lock()
            .committed
            .iter()
            .map(|(id, power)| Validator {
                identity: id.clone(),
                power: *power,
            })
            .collect()
    }

    pub fn total_power(&self) -> i64 {
        self.lock()
            .committed
            .values()
            .fold(0i64, |acc, p| acc.saturating_add(*p))
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Fold this block's changes into the committed view. `db` must reflect
    /// the block's final state. Subscribers are notified when the set changed.
    pub fn commit(&self, db: &dyn ReadTxn) -> Result<(), VotingError> {
        let touched = std::mem::take(&mut self.lock().pending);
        if touched.is_empty() {
            return Ok(());
        }

        let mut resolved = Vec::with_capacity(touched.len());
        for identity in touched {
            let power = stored_power(db, &identity)?;
            resolved.push((identity, power));
        }

        let mut changed = false;
        let snapshot = {
            let mut state = self.lock();
            for (identity, power) in resolved {
                let previous = if power == 0 {
                    state.committed.remove(&identity)
                } else {
                    state.committed.insert(identity, power)
                };
                changed |= previous != (power > 0).then_some(power);
            }
            state
                .committed
                .iter()
                .map(|(id, power)| Validator {
                    identity: id.clone(),
                    power: *power,
                })
                .collect::<Vec<_>>()
        };

        if changed {
            tracing::info!(validators = snapshot.len(), "validator set updated");
            // No receivers is fine; lagging receivers drop old updates.
            let _ = self.updates.send(snapshot);
        }
        Ok(())
    }

    /// Forget staged changes. The caller rolls back the matching writes.
    pub fn rollback(&self) {
        self.lock().pending.clear();
    }

    /// Receive the full validator list after each commit that changed it.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Validator>> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::MemoryStore;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    #[test]
    fn changes_apply_only_after_commit() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        set.set_power(&mut db, &id("a"), 10).unwrap();
        assert_eq!(set.get_power(&id("a")), 0);
        assert_eq!(stored_power(&db, &id("a")).unwrap(), 10);

        set.commit(&db).unwrap();
        assert_eq!(set.get_power(&id("a")), 10);
        assert_eq!(set.total_power(), 10);
    }

    #[test]
    fn zero_power_removes_validator() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        set.set_power(&mut db, &id("a"), 10).unwrap();
        set.commit(&db).unwrap();

        set.set_power(&mut db, &id("a"), 0).unwrap();
        assert!(set.is_validator(&id("a")));
        set.commit(&db).unwrap();
        assert!(set.get_validators().is_empty());
    }

    #[test]
    fn negative_power_is_rejected() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        assert!(matches!(
            set.set_power(&mut db, &id("a"), -1),
            Err(VotingError::NegativePower { .. })
        ));
        assert!(!set.has_pending());
    }

    #[test]
    fn rollback_discards_staged_changes() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        db.begin().unwrap();
        set.set_power(&mut db, &id("a"), 10).unwrap();
        db.rollback().unwrap();
        set.rollback();
        set.commit(&db).unwrap();
        assert_eq!(set.get_power(&id("a")), 0);
    }

    #[test]
    fn rolled_back_savepoint_never_reaches_committed_view() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        db.begin().unwrap();
        set.set_power(&mut db, &id("a"), 10).unwrap();
        db.rollback().unwrap();
        set.commit(&db).unwrap();
        assert_eq!(set.get_power(&id("a")), 0);
    }

    #[test]
    fn validators_are_sorted_and_reload_from_table() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        set.set_power(&mut db, &id("b"), 2).unwrap();
        set.set_power(&mut db, &id("a"), 1).unwrap();
        set.commit(&db).unwrap();

        let expected = vec![Validator::new("a", 1), Validator::new("b", 2)];
        assert_eq!(set.get_validators(), expected);
        assert_eq!(ValidatorSet::load(&db).unwrap().get_validators(), expected);
    }

    #[tokio::test]
    async fn subscribers_see_post_commit_set() {
        let set = ValidatorSet::new();
        let mut rx = set.subscribe();
        let mut db = MemoryStore::new();
        set.set_power(&mut db, &id("a"), 5).unwrap();
        set.commit(&db).unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![Validator::new("a", 5)]);
    }

    #[test]
    fn unchanged_commit_does_not_notify() {
        let set = ValidatorSet::new();
        let mut db = MemoryStore::new();
        set.set_power(&mut db, &id("a"), 5).unwrap();
        set.commit(&db).unwrap();

        let mut rx = set.subscribe();
        set.set_power(&mut db, &id("a"), 5).unwrap();
        set.commit(&db).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
