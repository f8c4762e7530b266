// SPDX-License-Identifier: MIT

//! Flow state persistence
//!
//! This module provides:
//! - `FlowState` / `FlowStateQuery` - the snapshot schema and list criteria
//! - `FlowStateStore` - the storage contract shared by all backends
//! - `InMemoryFlowStateStore` - sharded in-process map
//! - `FileFlowStateStore` - durable one-file-per-flow store

mod file;
mod memory;
mod record;
mod schema;
mod store;

pub use file::{decode_file_name, encode_file_name, FileFlowStateStore};
pub use memory::InMemoryFlowStateStore;
pub use record::{decode_record, StoredRecord, SCHEMA_VERSION};
pub use schema::{
    ExpectedVersion, FlowFailure, FlowState, FlowStatePage, FlowStateQuery, FlowStatus, Versioned,
};
pub use store::FlowStateStore;
