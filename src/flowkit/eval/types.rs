// SPDX-License-Identifier: MIT

//! Evaluation data types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::adk::error::EvalError;

/// Metrics the evaluator plugin can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    Faithfulness,
    AnswerRelevancy,
    Maliciousness,
    Regex,
    DeepEqual,
    Jsonata,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Faithfulness,
        Metric::AnswerRelevancy,
        Metric::Maliciousness,
        Metric::Regex,
        Metric::DeepEqual,
        Metric::Jsonata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Faithfulness => "FAITHFULNESS",
            Metric::AnswerRelevancy => "ANSWER_RELEVANCY",
            Metric::Maliciousness => "MALICIOUSNESS",
            Metric::Regex => "REGEX",
            Metric::DeepEqual => "DEEP_EQUAL",
            Metric::Jsonata => "JSONATA",
        }
    }

    /// Whether scoring calls out to a judge model
    pub fn needs_judge(&self) -> bool {
        matches!(
            self,
            Metric::Faithfulness | Metric::AnswerRelevancy | Metric::Maliciousness
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| EvalError::UnknownMetric(s.to_string()))
    }
}

/// One test case to score
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvalDataPoint {
    #[serde(default = "new_test_case_id")]
    pub test_case_id: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Retrieved documents the output should be grounded in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Value>,
}

fn new_test_case_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl EvalDataPoint {
    pub fn new(test_case_id: impl Into<String>, input: Value) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            input,
            output: None,
            context: Vec::new(),
            reference: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_context(mut self, context: Vec<Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_reference(mut self, reference: Value) -> Self {
        self.reference = Some(reference);
        self
    }

    /// The output, or `MissingOutput`
    pub fn require_output(&self) -> Result<&Value, EvalError> {
        self.output.as_ref().ok_or_else(|| EvalError::MissingOutput {
            test_case_id: self.test_case_id.clone(),
        })
    }

    /// The reference, or `MissingReference`
    pub fn require_reference(&self) -> Result<&Value, EvalError> {
        self.reference
            .as_ref()
            .ok_or_else(|| EvalError::MissingReference {
                test_case_id: self.test_case_id.clone(),
            })
    }
}

/// Render a JSON value as prompt text: strings verbatim, everything else as JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric, boolean or categorical score
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ScoreValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalStatus {
    Pass,
    Fail,
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ScoreDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Result of scoring one data point
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Score {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EvalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ScoreDetails>,
}

impl Score {
    pub fn passed(value: ScoreValue, pass: bool) -> Self {
        Self {
            score: Some(value),
            status: Some(if pass { EvalStatus::Pass } else { EvalStatus::Fail }),
            error: None,
            details: None,
        }
    }

    pub fn failed_with(error: impl Into<String>) -> Self {
        Self {
            status: Some(EvalStatus::Unknown),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.details = Some(ScoreDetails {
            reasoning: Some(reasoning.into()),
        });
        self
    }
}

/// A score keyed by the test case it belongs to
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvalResponse {
    pub test_case_id: String,
    pub evaluation: Score,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_parse() {
        assert_eq!("faithfulness".parse::<Metric>().unwrap(), Metric::Faithfulness);
        assert_eq!("answer-relevancy".parse::<Metric>().unwrap(), Metric::AnswerRelevancy);
        assert_eq!("DEEP_EQUAL".parse::<Metric>().unwrap(), Metric::DeepEqual);
        assert_eq!("jsonata".parse::<Metric>().unwrap(), Metric::Jsonata);
        assert!(matches!(
            "bleu".parse::<Metric>(),
            Err(EvalError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_data_point_defaults() {
        let dp: EvalDataPoint = serde_json::from_value(json!({
            "input": "What is Rust?",
            "output": "A language."
        }))
        .unwrap();

        assert!(!dp.test_case_id.is_empty());
        assert!(dp.context.is_empty());
        assert!(dp.reference.is_none());
        assert!(matches!(
            dp.require_reference(),
            Err(EvalError::MissingReference { .. })
        ));
    }

    #[test]
    fn test_response_layout() {
        let response = EvalResponse {
            test_case_id: "t1".to_string(),
            evaluation: Score::passed(ScoreValue::Number(0.75), true).with_reasoning("3 of 4"),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "testCaseId": "t1",
                "evaluation": {
                    "score": 0.75,
                    "status": "PASS",
                    "details": { "reasoning": "3 of 4" }
                }
            })
        );
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("plain")), "plain");
        assert_eq!(value_to_text(&json!({"a": 1})), "{\"a\":1}");
    }
}
