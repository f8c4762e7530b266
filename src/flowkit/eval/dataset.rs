use std::fs;
use std::path::Path;

use super::types::EvalDataPoint;
use crate::adk::error::FlowkitError;

/// Loads evaluation datasets (arrays of data points) from JSON or YAML files
pub struct DatasetLoader;

impl DatasetLoader {
    /// Load a dataset, choosing the format from the file extension
    pub fn load(path: &Path) -> Result<Vec<EvalDataPoint>, FlowkitError> {
        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let dataset = if is_yaml {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };
        log::info!("Loaded {} data points from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    pub fn from_json(content: &str) -> Result<Vec<EvalDataPoint>, FlowkitError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Vec<EvalDataPoint>, FlowkitError> {
        Ok(serde_yaml::from_str(content)?)
    }
}
