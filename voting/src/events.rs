//! Buffer of externally observed events awaiting a vote.
//!
//! A node stores what it observes here. Events whose resolution does not
//! exist yet are candidates for a vote-bodies transaction when this node
//! proposes; events whose resolution already exists only need this node's
//! vote ID, which is broadcast once and re-sent if it failed to land.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tally_store::{codec, ReadTxn, WriteTxn};
use tally_types::{ResolutionId, VotableEvent};

use crate::store::{processed, resolution_exists};
use crate::{ResolutionRegistry, VotingError};

pub const EVENTS_TABLE: &str = "events";

#[derive(Serialize, Deserialize)]
struct EventRow {
    event: VotableEvent,
    broadcasted: bool,
}

pub struct EventStore {
    registry: Arc<ResolutionRegistry>,
}

impl EventStore {
    pub fn new(registry: Arc<ResolutionRegistry>) -> Self {
        Self { registry }
    }

    /// Buffer an observed event. Returns `false` when the event was already
    /// buffered or its resolution was already processed.
    pub fn store_event(&self, db: &mut dyn WriteTxn, event: &VotableEvent) -> Result<bool, VotingError> {
        self.registry.get(&event.event_type)?;
        let id = event.id();

        if processed(db.as_read(), &id)? || db.contains(EVENTS_TABLE, id.as_bytes())? {
            return Ok(false);
        }

        let row = EventRow {
            event: event.clone(),
            broadcasted: false,
        };
        db.put(EVENTS_TABLE, id.as_bytes(), &codec::encode(&row)?)?;
        tracing::debug!(%id, event_type = %event.event_type, "stored event");
        Ok(true)
    }

    pub fn has_event(&self, db: &dyn ReadTxn, id: &ResolutionId) -> Result<bool, VotingError> {
        Ok(db.contains(EVENTS_TABLE, id.as_bytes())?)
    }

    /// Events that do not have a resolution yet, in ID order.
    pub fn get_events(&self, db: &dyn ReadTxn) -> Result<Vec<VotableEvent>, VotingError> {
        let mut out = Vec::new();
        for (id, row) in scan(db)? {
            if !resolution_exists(db, &id)? {
                out.push(row.event);
            }
        }
        Ok(out)
    }

    /// IDs of events whose resolution exists but whose vote this node has
    /// not broadcast yet.
    pub fn unbroadcasted(&self, db: &dyn ReadTxn) -> Result<Vec<ResolutionId>, VotingError> {
        let mut out = Vec::new();
        for (id, row) in scan(db)? {
            if !row.broadcasted && resolution_exists(db, &id)? {
                out.push(id);
            }
        }
        Ok(out)
    }

    pub fn mark_broadcasted(&self, db: &mut dyn WriteTxn, ids: &[ResolutionId]) -> Result<(), VotingError> {
        self.set_broadcasted(db, ids, true)
    }

    /// Queue the votes for `ids` to be broadcast again.
    pub fn mark_rebroadcast(&self, db: &mut dyn WriteTxn, ids: &[ResolutionId]) -> Result<(), VotingError> {
        self.set_broadcasted(db, ids, false)
    }

    fn set_broadcasted(
        &self,
        db: &mut dyn WriteTxn,
        ids: &[ResolutionId],
        broadcasted: bool,
    ) -> Result<(), VotingError> {
        for id in ids {
            let Some(bytes) = db.get(EVENTS_TABLE, id.as_bytes())? else {
                continue;
            };
            let mut row: EventRow = codec::decode(EVENTS_TABLE, &bytes)?;
            row.broadcasted = broadcasted;
            db.put(EVENTS_TABLE, id.as_bytes(), &codec::encode(&row)?)?;
        }
        Ok(())
    }

    pub fn delete_event(&self, db: &mut dyn WriteTxn, id: &ResolutionId) -> Result<(), VotingError> {
        db.delete(EVENTS_TABLE, id.as_bytes())?;
        Ok(())
    }

    pub fn delete_events(&self, db: &mut dyn WriteTxn, ids: &[ResolutionId]) -> Result<(), VotingError> {
        for id in ids {
            db.delete(EVENTS_TABLE, id.as_bytes())?;
        }
        Ok(())
    }
}

fn scan(db: &dyn ReadTxn) -> Result<Vec<(ResolutionId, EventRow)>, VotingError> {
    let mut out = Vec::new();
    for (key, value) in db.scan(EVENTS_TABLE)? {
        let row: EventRow = codec::decode(EVENTS_TABLE, &value)?;
        // Keys are always the event's own ID.
        let id = row.event.id();
        if id.as_bytes().as_slice() != key.as_slice() {
            return Err(tally_store::StoreError::Corruption(format!(
                "{EVENTS_TABLE}: row stored under foreign key"
            ))
            .into());
        }
        out.push((id, row));
    }
    Ok(out)
}
