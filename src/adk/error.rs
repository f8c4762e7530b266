// SPDX-License-Identifier: MIT

//! Typed error handling for flowkit-rs
//!
//! Each layer owns an error enum built with thiserror; `FlowkitError` is the
//! top-level type the runtime, CLI and server deal in.

use crate::flowkit::state::ExpectedVersion;
use thiserror::Error;

/// Top-level error type for flowkit-rs
#[derive(Debug, Error)]
pub enum FlowkitError {
    /// Flow state store failures
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Judge / generator model failures
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Evaluator failures
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// A flow body failed or could not be resumed
    #[error("Flow '{flow}' failed: {message}")]
    Flow { flow: String, message: String },

    /// A flow paused until input for the named step is supplied
    #[error("Flow interrupted, waiting on step '{0}'")]
    Interrupted(String),

    /// No stored state for the requested flow id
    #[error("Flow state '{0}' not found")]
    FlowNotFound(String),

    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors surfaced by a `FlowStateStore`
///
/// Absence is never an error: `load` returns `Ok(None)` for unknown ids.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage medium is unreachable or rejected the operation
    #[error("Persistence failure ({context}): {source}")]
    Persistence {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes exist but do not decode into a valid flow state
    #[error("Stored state for '{id}' is corrupt: {reason}")]
    Deserialization { id: String, reason: String },

    /// A caller-supplied state was rejected before any write
    #[error("Invalid flow state for '{id}': {reason}")]
    Validation { id: String, reason: String },

    /// A conditional save found a different version than expected
    #[error("Version conflict on '{id}': expected {expected}, found {actual:?}")]
    VersionConflict {
        id: String,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// The provider answered with a non-success status
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Evaluator configuration and scoring errors
#[derive(Debug, Error)]
pub enum EvalError {
    /// Judge model required by a metric was not configured
    #[error("Judge model must be specified to compute {0}")]
    MissingJudge(String),

    /// Embedder required by a metric was not configured
    #[error("Embedder must be specified to compute {0}")]
    MissingEmbedder(String),

    /// The data point carries no reference value
    #[error("Test case '{test_case_id}' has no reference")]
    MissingReference { test_case_id: String },

    /// The reference value has the wrong shape or does not compile
    #[error("Test case '{test_case_id}' has an invalid reference: {reason}")]
    InvalidReference {
        test_case_id: String,
        reason: String,
    },

    /// The data point carries no context documents
    #[error("Test case '{test_case_id}' has no context")]
    MissingContext { test_case_id: String },

    /// The data point carries no output to score
    #[error("Test case '{test_case_id}' has no output")]
    MissingOutput { test_case_id: String },

    /// Unknown metric name
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// The judge answered with something that is not the expected JSON
    #[error("Unparseable judge response: {0}")]
    JudgeResponse(String),

    /// Failure talking to the judge or embedder
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl FlowkitError {
    /// Create a flow failure
    pub fn flow(flow: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Flow {
            flow: flow.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl StoreError {
    pub fn persistence(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Persistence {
            context: context.into(),
            source,
        }
    }

    pub fn deserialization(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Deserialization {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl ModelError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts_to_top_level() {
        let err: FlowkitError = StoreError::deserialization("f1", "bad json").into();
        assert!(matches!(err, FlowkitError::Store(StoreError::Deserialization { .. })));
        assert_eq!(
            err.to_string(),
            "Store error: Stored state for 'f1' is corrupt: bad json"
        );
    }

    #[test]
    fn test_model_error_converts_to_eval_error() {
        let err: EvalError = ModelError::api("Gemini", "quota").into();
        assert_eq!(err.to_string(), "API error from Gemini: quota");
    }

    #[test]
    fn test_persistence_keeps_io_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = StoreError::persistence("write f1", io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("write f1"));
    }
}
