// SPDX-License-Identifier: MIT

//! File-backed flow state store
//!
//! Layout: one `<encoded id>.json` file per flow under a root directory, each
//! holding a `StoredRecord` envelope. Ids whose encoded name would be too long
//! for the filesystem are stored as `~<sha256 hex>.json` instead, and listing
//! recovers their id from the envelope. Writes land in a temporary sibling
//! file that is renamed over the target, so readers see either the old record
//! or the new one.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::record::{decode_record, encode_record, StoredRecord};
use super::schema::{ExpectedVersion, FlowState, FlowStatePage, FlowStateQuery, Versioned};
use super::store::{paginate, validate_for_save, FlowStateStore};
use crate::adk::error::StoreError;

const RECORD_EXTENSION: &str = ".json";
const HASHED_PREFIX: char = '~';
/// Longest percent-encoded stem kept as a readable file name
const MAX_ENCODED_STEM: usize = 150;

/// Durable flow state store keeping one JSON file per id
#[derive(Debug)]
pub struct FileFlowStateStore {
    root: PathBuf,
    io_timeout: Duration,
    /// Per-id write locks; ids never share one
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileFlowStateStore {
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_timeout(root, Self::DEFAULT_IO_TIMEOUT).await
    }

    pub async fn open_with_timeout(
        root: impl Into<PathBuf>,
        io_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        let store = Self {
            root,
            io_timeout,
            locks: DashMap::new(),
        };
        store
            .bounded(
                format!("create {}", store.root.display()),
                fs::create_dir_all(&store.root),
            )
            .await?;
        log::info!("Opened flow state store at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(encode_file_name(id))
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run an I/O future under the store's timeout
    async fn bounded<T, F>(&self, context: String, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = io::Result<T>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::persistence(context, e)),
            Err(_) => Err(StoreError::persistence(
                context,
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no response within {:?}", self.io_timeout),
                ),
            )),
        }
    }

    async fn read_bytes(
        &self,
        context: String,
        path: PathBuf,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let read = async move {
            match fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        };
        self.bounded(context, read).await
    }

    async fn read_record(&self, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        match self.read_bytes(format!("read {}", id), self.path_for(id)).await? {
            Some(bytes) => decode_record(id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Read a `~<digest>.json` record, taking its id from the envelope
    async fn read_hashed(&self, name: &str) -> Result<Option<StoredRecord>, StoreError> {
        #[derive(Deserialize)]
        struct Envelope {
            state: Owner,
        }
        #[derive(Deserialize)]
        struct Owner {
            id: String,
        }

        let path = self.root.join(name);
        let Some(bytes) = self.read_bytes(format!("read {}", name), path).await? else {
            return Ok(None);
        };
        let owner = serde_json::from_slice::<Envelope>(&bytes)
            .map_err(|e| StoreError::deserialization(name, e.to_string()))?
            .state
            .id;
        if encode_file_name(&owner) != name {
            return Err(StoreError::deserialization(
                name,
                format!("stored state for '{}' is under the wrong file name", owner),
            ));
        }
        decode_record(&owner, &bytes).map(Some)
    }

    async fn write_record(&self, id: &str, record: &StoredRecord) -> Result<(), StoreError> {
        let bytes = encode_record(id, record)?;
        let target = self.path_for(id);
        let tmp = self.root.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await
        };

        // Only the temp write is bounded; an error never follows a completed rename.
        let result = match self.bounded(format!("write {}", id), write).await {
            Ok(()) => fs::rename(&tmp, &target)
                .await
                .map_err(|e| StoreError::persistence(format!("rename {}", id), e)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }
}

#[async_trait]
impl FlowStateStore for FileFlowStateStore {
    async fn load_versioned(&self, id: &str) -> Result<Option<Versioned<FlowState>>, StoreError> {
        Ok(self.read_record(id).await?.map(|record| Versioned {
            version: record.version,
            value: record.state,
        }))
    }

    async fn save_if(
        &self,
        id: &str,
        state: &FlowState,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        validate_for_save(id, state)?;

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        // A corrupt record still has to be overwritable by an unconditional save.
        let current = match self.read_record(id).await {
            Ok(record) => record.map(|r| r.version),
            Err(StoreError::Deserialization { .. }) if expected == ExpectedVersion::Any => None,
            Err(e) => return Err(e),
        };
        if !expected.admits(current) {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected,
                actual: current,
            });
        }

        let version = current.map_or(1, |v| v + 1);
        self.write_record(id, &StoredRecord::new(version, state.clone()))
            .await?;
        log::debug!("Saved flow state {} at version {}", id, version);
        Ok(version)
    }

    async fn list(&self, query: Option<&FlowStateQuery>) -> Result<FlowStatePage, StoreError> {
        log::debug!("FileFlowStateStore.list {:?}", query);
        let root = self.root.clone();
        let names = self
            .bounded(format!("list {}", root.display()), async move {
                let mut names = Vec::new();
                let mut entries = fs::read_dir(&root).await?;
                while let Some(entry) = entries.next_entry().await? {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
                Ok(names)
            })
            .await?;

        let mut states = Vec::new();
        for name in names {
            if name.starts_with('.') || !name.ends_with(RECORD_EXTENSION) {
                continue;
            }
            // Absent here means the file was replaced mid-listing by a rename.
            let record = if name.starts_with(HASHED_PREFIX) {
                self.read_hashed(&name).await?
            } else if let Some(id) = decode_file_name(&name) {
                self.read_record(&id).await?
            } else {
                log::warn!("Skipping foreign file in state directory: {}", name);
                continue;
            };
            if let Some(record) = record {
                states.push(record.state);
            }
        }
        Ok(paginate(states, query))
    }
}

/// Map an id to a file name, percent-encoding every byte outside `[A-Za-z0-9_-]`
///
/// Encodings longer than `MAX_ENCODED_STEM` fall back to `~<sha256 hex>.json`.
pub fn encode_file_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len() + RECORD_EXTENSION.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            name.push(b as char);
        } else {
            name.push_str(&format!("%{:02X}", b));
        }
    }
    if name.len() > MAX_ENCODED_STEM {
        name = format!("{}{}", HASHED_PREFIX, hex::encode(Sha256::digest(id.as_bytes())));
    }
    name.push_str(RECORD_EXTENSION);
    name
}

/// Inverse of `encode_file_name` for readable names; `None` for hashed names
/// and names it could not have produced
pub fn decode_file_name(name: &str) -> Option<String> {
    let stem = name.strip_suffix(RECORD_EXTENSION)?;
    let raw = stem.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' => {
                let hex = stem.get(i + 1..i + 3)?;
                bytes.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' => {
                bytes.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(bytes).ok()
}
