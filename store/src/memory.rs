//! In-memory backend with layered transactions.
//!
//! Committed data lives in `base`; each open transaction level is an overlay
//! recording puts (`Some`) and deletes (`None`). Reads consult the overlays
//! from innermost to outermost before falling back to `base`. All maps are
//! ordered, so scans and the state hash are deterministic.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{codec, ReadTxn, StoreError, WriteTxn};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;
type Overlay = BTreeMap<String, BTreeMap<Vec<u8>, Option<Vec<u8>>>>;

#[derive(Default)]
pub struct MemoryStore {
    base: BTreeMap<String, Table>,
    layers: Vec<Overlay>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// BLAKE2b-256 over every table's visible entries in key order.
    ///
    /// Two stores holding the same logical state always hash identically,
    /// regardless of the order in which the state was written.
    pub fn state_hash(&self) -> [u8; 32] {
        let mut hasher = Blake2b::<U32>::new();
        for table in self.table_names() {
            let entries = self.merged(&table);
            if entries.is_empty() {
                continue;
            }
            hasher.update((table.len() as u64).to_be_bytes());
            hasher.update(table.as_bytes());
            for (k, v) in entries {
                hasher.update((k.len() as u64).to_be_bytes());
                hasher.update(&k);
                hasher.update((v.len() as u64).to_be_bytes());
                hasher.update(&v);
            }
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// Write the committed state to `path`. Fails while a transaction is open.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        if !self.layers.is_empty() {
            return Err(StoreError::TransactionOpen(self.layers.len()));
        }
        fs::write(path, codec::encode(&self.base)?)?;
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        Ok(Self {
            base: codec::decode("snapshot", &bytes)?,
            layers: Vec::new(),
        })
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.base.keys().cloned().collect();
        for layer in &self.layers {
            names.extend(layer.keys().cloned());
        }
        names.sort();
        names.dedup();
        names
    }

    fn merged(&self, table: &str) -> Table {
        let mut out = self.base.get(table).cloned().unwrap_or_default();
        for layer in &self.layers {
            if let Some(writes) = layer.get(table) {
                apply(&mut out, writes);
            }
        }
        out
    }

    fn write(&mut self, table: &str, key: &[u8], value: Option<Vec<u8>>) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer
                    .entry(table.to_string())
                    .or_default()
                    .insert(key.to_vec(), value);
            }
            // Outside any transaction writes land directly in committed state.
            None => {
                let t = self.base.entry(table.to_string()).or_default();
                match value {
                    Some(v) => {
                        t.insert(key.to_vec(), v);
                    }
                    None => {
                        t.remove(key);
                    }
                }
            }
        }
    }
}

fn apply(table: &mut Table, writes: &BTreeMap<Vec<u8>, Option<Vec<u8>>>) {
    for (k, v) in writes {
        match v {
            Some(v) => {
                table.insert(k.clone(), v.clone());
            }
            None => {
                table.remove(k);
            }
        }
    }
}

impl ReadTxn for MemoryStore {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        for layer in self.layers.iter().rev() {
            if let Some(v) = layer.get(table).and_then(|t| t.get(key)) {
                return Ok(v.clone());
            }
        }
        Ok(self.base.get(table).and_then(|t| t.get(key)).cloned())
    }

    fn scan(&self, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self.merged(table).into_iter().collect())
    }
}

impl WriteTxn for MemoryStore {
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write(table, key, Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<(), StoreError> {
        self.write(table, key, None);
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.layers.push(Overlay::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let top = self
            .layers
            .pop()
            .ok_or(StoreError::NoTransaction("commit"))?;
        match self.layers.last_mut() {
            Some(parent) => {
                for (table, writes) in top {
                    parent.entry(table).or_default().extend(writes);
                }
            }
            None => {
                for (table, writes) in top {
                    apply(self.base.entry(table).or_default(), &writes);
                }
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.layers
            .pop()
            .map(|_| ())
            .ok_or(StoreError::NoTransaction("roll back"))
    }

    fn depth(&self) -> usize {
        self.layers.len()
    }

    fn as_read(&self) -> &dyn ReadTxn {
        self
    }
}
