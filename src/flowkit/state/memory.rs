// SPDX-License-Identifier: MIT

//! In-memory flow state store
//!
//! Useful for tests and single-process tools. Nothing survives the process.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::record::decode_state;
use super::schema::{ExpectedVersion, FlowState, FlowStatePage, FlowStateQuery, Versioned};
use super::store::{paginate, validate_for_save, FlowStateStore};
use crate::adk::error::StoreError;

#[derive(Debug, Clone)]
struct Slot {
    version: u64,
    /// Serialized `FlowState`; kept as bytes so loads hand out fresh values
    bytes: Vec<u8>,
}

/// Flow state store backed by a sharded concurrent map.
///
/// Writes lock only the shard holding their id, so saves to different ids
/// do not serialize behind one global lock.
#[derive(Debug, Default)]
pub struct InMemoryFlowStateStore {
    slots: DashMap<String, Slot>,
}

impl InMemoryFlowStateStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Number of stored ids
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store raw bytes for `id` without validation.
    ///
    /// Intended for import tooling and for exercising corruption handling.
    pub fn insert_raw(&self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        match self.slots.entry(id.into()) {
            Entry::Occupied(mut e) => {
                let slot = e.get_mut();
                slot.version += 1;
                slot.bytes = bytes;
            }
            Entry::Vacant(e) => {
                e.insert(Slot { version: 1, bytes });
            }
        }
    }
}

#[async_trait]
impl FlowStateStore for InMemoryFlowStateStore {
    async fn load_versioned(&self, id: &str) -> Result<Option<Versioned<FlowState>>, StoreError> {
        let slot = match self.slots.get(id) {
            Some(slot) => slot.clone(),
            None => return Ok(None),
        };
        let state = decode_state(id, &slot.bytes)?;
        Ok(Some(Versioned {
            version: slot.version,
            value: state,
        }))
    }

    async fn save_if(
        &self,
        id: &str,
        state: &FlowState,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        validate_for_save(id, state)?;
        let bytes = serde_json::to_vec(state).map_err(|e| StoreError::validation(id, e.to_string()))?;

        // The entry guard holds the shard lock across compare and write.
        match self.slots.entry(id.to_string()) {
            Entry::Occupied(mut e) => {
                let current = e.get().version;
                if !expected.admits(Some(current)) {
                    return Err(StoreError::VersionConflict {
                        id: id.to_string(),
                        expected,
                        actual: Some(current),
                    });
                }
                let version = current + 1;
                e.insert(Slot { version, bytes });
                Ok(version)
            }
            Entry::Vacant(e) => {
                if !expected.admits(None) {
                    return Err(StoreError::VersionConflict {
                        id: id.to_string(),
                        expected,
                        actual: None,
                    });
                }
                e.insert(Slot { version: 1, bytes });
                Ok(1)
            }
        }
    }

    async fn list(&self, query: Option<&FlowStateQuery>) -> Result<FlowStatePage, StoreError> {
        log::debug!("InMemoryFlowStateStore.list {:?}", query);
        let snapshot: Vec<(String, Vec<u8>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().bytes.clone()))
            .collect();

        let mut states = Vec::with_capacity(snapshot.len());
        for (id, bytes) in snapshot {
            states.push(decode_state(&id, &bytes)?);
        }
        Ok(paginate(states, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowkit::state::FlowStatus;
    use serde_json::json;
    use std::sync::Arc;

    fn joke_state(id: &str) -> FlowState {
        FlowState::new(id, "jokeFlow")
            .with_status(FlowStatus::Succeeded)
            .with_output(json!("From gemini-pro: ..."))
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryFlowStateStore::new();
        let state = joke_state("f1");

        store.save("f1", &state).await.unwrap();
        assert_eq!(store.load("f1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_load_unknown_is_none() {
        let store = InMemoryFlowStateStore::new();
        assert!(store.load("missing").await.unwrap().is_none());
        assert!(store.list(None).await.unwrap().states.is_empty());
    }

    #[tokio::test]
    async fn test_versions_increment() {
        let store = InMemoryFlowStateStore::new();
        let state = joke_state("f1");

        assert_eq!(store.save_if("f1", &state, ExpectedVersion::Absent).await.unwrap(), 1);
        assert_eq!(store.save_if("f1", &state, ExpectedVersion::Exactly(1)).await.unwrap(), 2);
        assert_eq!(store.load_versioned("f1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_without_write() {
        let store = InMemoryFlowStateStore::new();
        store.save("f1", &joke_state("f1")).await.unwrap();
        store.save("f1", &joke_state("f1")).await.unwrap();

        let replacement = joke_state("f1").with_output(json!("stale"));
        let err = store
            .save_if("f1", &replacement, ExpectedVersion::Exactly(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::VersionConflict {
                actual: Some(2),
                ..
            }
        ));
        assert_eq!(
            store.load("f1").await.unwrap().unwrap().output,
            Some(json!("From gemini-pro: ..."))
        );
    }

    #[tokio::test]
    async fn test_insert_raw_corruption_is_isolated() {
        let store = InMemoryFlowStateStore::new();
        store.save("good", &joke_state("good")).await.unwrap();
        store.insert_raw("bad", "{\"id\": \"bad\", \"status\": 7");

        assert!(matches!(
            store.load("bad").await,
            Err(StoreError::Deserialization { .. })
        ));
        assert!(store.load("good").await.unwrap().is_some());
        assert!(matches!(
            store.list(None).await,
            Err(StoreError::Deserialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_saves_to_different_ids() {
        let store = Arc::new(InMemoryFlowStateStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("flow-{i:02}");
                s.save(&id, &joke_state(&id)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.len(), 32);
        assert_eq!(store.list(None).await.unwrap().states.len(), 32);
    }

    #[tokio::test]
    async fn test_concurrent_create_exactly_one_wins() {
        let store = Arc::new(InMemoryFlowStateStore::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.save_if("f1", &joke_state("f1"), ExpectedVersion::Absent)
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
