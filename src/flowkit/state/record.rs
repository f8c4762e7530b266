// SPDX-License-Identifier: MIT

//! Persisted record layout and decoding
//!
//! Durable backends store one envelope per id:
//!
//! ```json
//! { "schemaVersion": 1, "version": 3, "state": { "id": "f1", ... } }
//! ```

use serde::{Deserialize, Serialize};

use super::schema::FlowState;
use crate::adk::error::StoreError;

/// Highest envelope schema this build understands
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub schema_version: u32,
    pub version: u64,
    pub state: FlowState,
}

impl StoredRecord {
    pub fn new(version: u64, state: FlowState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            version,
            state,
        }
    }
}

/// Serialize a record for storage
pub fn encode_record(id: &str, record: &StoredRecord) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|e| StoreError::validation(id, e.to_string()))
}

/// Parse stored bytes into a record, rejecting anything schema-invalid
pub fn decode_record(id: &str, bytes: &[u8]) -> Result<StoredRecord, StoreError> {
    let record: StoredRecord = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::deserialization(id, e.to_string()))?;
    if record.schema_version > SCHEMA_VERSION {
        return Err(StoreError::deserialization(
            id,
            format!("unsupported schema version {}", record.schema_version),
        ));
    }
    check_state(id, &record.state)?;
    Ok(record)
}

/// Parse a bare serialized `FlowState`
pub fn decode_state(id: &str, bytes: &[u8]) -> Result<FlowState, StoreError> {
    let state: FlowState = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::deserialization(id, e.to_string()))?;
    check_state(id, &state)?;
    Ok(state)
}

fn check_state(id: &str, state: &FlowState) -> Result<(), StoreError> {
    state
        .validate()
        .map_err(|reason| StoreError::deserialization(id, reason))?;
    if state.id != id {
        return Err(StoreError::deserialization(
            id,
            format!("stored state belongs to '{}'", state.id),
        ));
    }
    Ok(())
}
