// SPDX-License-Identifier: MIT

//! Flow state schema definitions

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Keeps a present JSON `null` as `Some(Value::Null)`; an absent key falls back to `default`
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Execution status of a flow
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Running,
    Succeeded,
    Failed,
    Interrupted,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Running => "running",
            FlowStatus::Succeeded => "succeeded",
            FlowStatus::Failed => "failed",
            FlowStatus::Interrupted => "interrupted",
        }
    }

    /// Whether the flow has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Succeeded | FlowStatus::Failed)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(FlowStatus::Running),
            "succeeded" => Ok(FlowStatus::Succeeded),
            "failed" => Ok(FlowStatus::Failed),
            "interrupted" => Ok(FlowStatus::Interrupted),
            other => Err(format!("unknown flow status '{}'", other)),
        }
    }
}

/// Error payload recorded on a failed flow
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FlowFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub details: Option<Value>,
}

impl FlowFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            details: None,
        }
    }
}

/// Serializable snapshot of one flow execution
///
/// A snapshot is a value: `save` replaces the stored snapshot for its id
/// wholesale, there is no field-level merge.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    pub id: String,
    /// Declared flow name
    pub name: String,
    pub status: FlowStatus,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub input: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub output: Option<Value>,
    /// Step results keyed by step name, in completion order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub steps: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowFailure>,
    /// Step an interrupted flow is waiting on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_on_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FlowState {
    /// Create a running state with no recorded steps
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: FlowStatus::Running,
            input: None,
            output: None,
            steps: IndexMap::new(),
            error: None,
            blocked_on_step: None,
            started_at: None,
            updated_at: None,
        }
    }

    pub fn with_status(mut self, status: FlowStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Check the shape rules serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if let Some(step) = &self.blocked_on_step {
            if step.is_empty() {
                return Err("blockedOnStep must not be empty when present".to_string());
            }
        }
        Ok(())
    }
}

/// Filter and pagination criteria for `list`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FlowStateQuery {
    /// Exact flow name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exact status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FlowStatus>,
    /// Maximum number of states per page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Continuation token returned by a previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl FlowStateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn status(mut self, status: FlowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Whether a state passes the name and status filters
    pub fn matches(&self, state: &FlowState) -> bool {
        if let Some(name) = &self.name {
            if &state.name != name {
                return false;
            }
        }
        if let Some(status) = self.status {
            if state.status != status {
                return false;
            }
        }
        true
    }
}

/// One page of `list` results
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatePage {
    pub states: Vec<FlowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// A stored value together with its store version
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Starts at 1 on first write and grows by one per write
    pub version: u64,
    pub value: T,
}

/// Precondition for a conditional save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// Unconditional write, last writer wins
    #[default]
    Any,
    /// Only write if no state exists for the id
    Absent,
    /// Only write if the stored version equals this one
    Exactly(u64),
}

impl ExpectedVersion {
    /// Check the precondition against the currently stored version
    pub fn admits(&self, current: Option<u64>) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Absent => current.is_none(),
            ExpectedVersion::Exactly(v) => current == Some(*v),
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::Any => f.write_str("any version"),
            ExpectedVersion::Absent => f.write_str("no stored state"),
            ExpectedVersion::Exactly(v) => write!(f, "version {}", v),
        }
    }
}
