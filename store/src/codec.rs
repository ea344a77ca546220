//! Row encoding shared by every table.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::StoreError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode a stored row. A row that fails to decode means the table holds data
/// this binary cannot interpret, so it is reported as corruption.
pub fn decode<T: DeserializeOwned>(table: &str, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corruption(format!("{table}: {e}")))
}
