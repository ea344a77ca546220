//! Transactional key-value storage for the execution core.
//!
//! Every state table (accounts, voters, resolutions, processed IDs, events)
//! lives behind these traits. A [`WriteTxn`] supports nested transactions:
//! `begin` opens a new level, `commit` folds it into the level below and
//! `rollback` discards it. Block execution uses one level per block, one per
//! transaction spend, and one more for the route's own writes so that a
//! failing handler never undoes the fee that was charged.

pub mod codec;
pub mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

/// Read access to the tables.
pub trait ReadTxn {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Every entry of `table`, in ascending key order.
    fn scan(&self, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(table, key)?.is_some())
    }
}

/// Writable handle with nested transaction support.
pub trait WriteTxn: ReadTxn {
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, table: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Open a new (possibly nested) transaction level.
    fn begin(&mut self) -> Result<(), StoreError>;

    /// Fold the innermost level into its parent.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard the innermost level.
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Number of open transaction levels.
    fn depth(&self) -> usize;

    fn as_read(&self) -> &dyn ReadTxn;
}

/// A transaction level scoped to a borrow of its parent.
///
/// Dropping a savepoint without calling [`Savepoint::commit`] rolls it back,
/// so an early `?` return never leaks partial writes into the parent.
pub struct Savepoint<'a> {
    db: &'a mut dyn WriteTxn,
    open: bool,
}

impl<'a> Savepoint<'a> {
    pub fn begin(db: &'a mut dyn WriteTxn) -> Result<Self, StoreError> {
        db.begin()?;
        Ok(Self { db, open: true })
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        self.open = false;
        self.db.commit()
    }

    pub fn rollback(mut self) -> Result<(), StoreError> {
        self.open = false;
        self.db.rollback()
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.db.rollback() {
                tracing::error!(error = %e, "failed to roll back abandoned savepoint");
            }
        }
    }
}

impl ReadTxn for Savepoint<'_> {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(table, key)
    }

    fn scan(&self, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.db.scan(table)
    }
}

impl WriteTxn for Savepoint<'_> {
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.put(table, key, value)
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<(), StoreError> {
        self.db.delete(table, key)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.db.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.db.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.db.rollback()
    }

    fn depth(&self) -> usize {
        self.db.depth()
    }

    fn as_read(&self) -> &dyn ReadTxn {
        self
    }
}
