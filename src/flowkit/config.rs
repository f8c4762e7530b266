//! Environment-driven configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::FlowkitError;
use crate::flowkit::state::{FileFlowStateStore, FlowStateStore, InMemoryFlowStateStore};

pub const DEFAULT_STATE_DIR: &str = ".flowkit/state";
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_JUDGE_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_EMBEDDER_MODEL: &str = "text-embedding-004";

/// Which FlowStateStore implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File,
}

impl FromStr for StoreBackend {
    type Err = FlowkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            other => Err(FlowkitError::config(format!(
                "unknown store backend '{}', expected 'memory' or 'file'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store: StoreBackend,
    pub state_dir: PathBuf,
    pub io_timeout: Duration,
    pub judge_model: String,
    pub embedder_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreBackend::File,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            embedder_model: DEFAULT_EMBEDDER_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Read `FLOWKIT_*` variables from the process environment
    pub fn from_env() -> Result<Self, FlowkitError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlowkitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(store) = get("FLOWKIT_STORE") {
            config.store = store.parse()?;
        }
        if let Some(dir) = get("FLOWKIT_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(secs) = get("FLOWKIT_IO_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                FlowkitError::config(format!("FLOWKIT_IO_TIMEOUT_SECS must be an integer, got '{}'", secs))
            })?;
            if secs == 0 {
                return Err(FlowkitError::config("FLOWKIT_IO_TIMEOUT_SECS must be positive"));
            }
            config.io_timeout = Duration::from_secs(secs);
        }
        if let Some(model) = get("FLOWKIT_JUDGE_MODEL") {
            config.judge_model = model;
        }
        if let Some(model) = get("FLOWKIT_EMBEDDER_MODEL") {
            config.embedder_model = model;
        }
        Ok(config)
    }

    /// Open the configured store backend
    pub async fn open_store(&self) -> Result<Arc<dyn FlowStateStore>, FlowkitError> {
        let store: Arc<dyn FlowStateStore> = match self.store {
            StoreBackend::Memory => {
                log::info!("Using in-memory flow state store");
                Arc::new(InMemoryFlowStateStore::new())
            }
            StoreBackend::File => {
                log::info!("Using file flow state store at {}", self.state_dir.display());
                Arc::new(
                    FileFlowStateStore::open_with_timeout(&self.state_dir, self.io_timeout)
                        .await?,
                )
            }
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.store, StoreBackend::File);
        assert_eq!(config.io_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FLOWKIT_STORE", "Memory"),
            ("FLOWKIT_STATE_DIR", "/tmp/flows"),
            ("FLOWKIT_IO_TIMEOUT_SECS", "3"),
            ("FLOWKIT_JUDGE_MODEL", "gpt-4o-mini"),
            ("FLOWKIT_EMBEDDER_MODEL", ""),
        ]))
        .unwrap();

        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/flows"));
        assert_eq!(config.io_timeout, Duration::from_secs(3));
        assert_eq!(config.judge_model, "gpt-4o-mini");
        assert_eq!(config.embedder_model, DEFAULT_EMBEDDER_MODEL);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("FLOWKIT_STORE", "redis")])),
            Err(FlowkitError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("FLOWKIT_IO_TIMEOUT_SECS", "soon")])),
            Err(FlowkitError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("FLOWKIT_IO_TIMEOUT_SECS", "0")])),
            Err(FlowkitError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            state_dir: dir.path().join("state"),
            ..Config::default()
        };
        let store = config.open_store().await.unwrap();
        assert!(store.list(None).await.unwrap().states.is_empty());
        assert!(dir.path().join("state").is_dir());
    }
}
