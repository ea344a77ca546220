//! Vote rebroadcast queue: resolution IDs whose local vote failed to land.
//!
//! The mempool reports IDs here while it only holds a read view of the
//! state; the node flushes them into the event store afterwards so the
//! votes go out again.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use tally_mempool::Rebroadcaster;
use tally_store::WriteTxn;
use tally_types::ResolutionId;
use tally_voting::{EventStore, VotingError};

/// Maximum queued IDs.
const MAX_QUEUED_IDS: usize = 4096;

pub struct RebroadcastQueue {
    ids: Mutex<BTreeSet<ResolutionId>>,
    max_entries: usize,
}

impl RebroadcastQueue {
    pub fn new(max_entries: usize) -> Self {
        Self {
            ids: Mutex::new(BTreeSet::new()),
            max_entries,
        }
    }

    pub fn with_default() -> Self {
        Self::new(MAX_QUEUED_IDS)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every queued ID, in ID order.
    pub fn drain(&self) -> Vec<ResolutionId> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    /// Mark every queued ID for rebroadcast in `events`. Returns how many
    /// IDs were flushed.
    pub fn flush(&self, events: &EventStore, db: &mut dyn WriteTxn) -> Result<usize, VotingError> {
        let ids = self.drain();
        if ids.is_empty() {
            return Ok(0);
        }
        events.mark_rebroadcast(db, &ids)?;
        tracing::debug!(count = ids.len(), "queued votes for rebroadcast");
        Ok(ids.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<ResolutionId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RebroadcastQueue {
    fn default() -> Self {
        Self::with_default()
    }
}

impl Rebroadcaster for RebroadcastQueue {
    fn mark_rebroadcast(&self, ids: &[ResolutionId]) {
        let mut queued = self.lock();
        for id in ids {
            if queued.len() >= self.max_entries && !queued.contains(id) {
                tracing::warn!(%id, "rebroadcast queue full, dropping vote");
                continue;
            }
            queued.insert(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ResolutionId {
        ResolutionId::new([n; 16])
    }

    #[test]
    fn deduplicates_and_drains_in_order() {
        let queue = RebroadcastQueue::with_default();
        queue.mark_rebroadcast(&[id(3), id(1)]);
        queue.mark_rebroadcast(&[id(1), id(2)]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain(), vec![id(1), id(2), id(3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drops_new_ids_when_full() {
        let queue = RebroadcastQueue::new(2);
        queue.mark_rebroadcast(&[id(1), id(2), id(3)]);
        assert_eq!(queue.drain(), vec![id(1), id(2)]);
    }
}
