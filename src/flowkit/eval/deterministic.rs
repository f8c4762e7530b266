//! Scorers that compare output and reference without a model

use async_trait::async_trait;
use bumpalo::Bump;
use jsonata_rs::JsonAta;
use regex::Regex;
use serde_json::Value;

use super::types::{value_to_text, EvalDataPoint, EvalStatus, Score, ScoreValue};
use super::Scorer;
use crate::adk::error::EvalError;

/// Matches the output against the regex given as reference
pub struct RegexScorer;

#[async_trait]
impl Scorer for RegexScorer {
    async fn score(&self, dp: &EvalDataPoint) -> Result<Score, EvalError> {
        let pattern = dp
            .require_reference()?
            .as_str()
            .ok_or_else(|| EvalError::InvalidReference {
                test_case_id: dp.test_case_id.clone(),
                reason: "reference must be a regex string".to_string(),
            })?;
        let re = Regex::new(pattern).map_err(|e| EvalError::InvalidReference {
            test_case_id: dp.test_case_id.clone(),
            reason: e.to_string(),
        })?;

        let output = value_to_text(dp.require_output()?);
        let matched = re.is_match(&output);
        Ok(Score::passed(ScoreValue::Bool(matched), matched))
    }
}

/// Structural JSON equality of output and reference
pub struct DeepEqualScorer;

#[async_trait]
impl Scorer for DeepEqualScorer {
    async fn score(&self, dp: &EvalDataPoint) -> Result<Score, EvalError> {
        let reference = dp.require_reference()?;
        let output = dp.require_output()?;
        let equal = output == reference;
        Ok(Score::passed(ScoreValue::Bool(equal), equal))
    }
}

/// Evaluates the JSONata expression given as reference against the output
///
/// The expression result becomes the score; it passes unless it is falsy
/// (`false`, `0`, `""`, `null` or undefined).
pub struct JsonataScorer;

impl JsonataScorer {
    /// Evaluate `expression` against `input`; `None` when the result is undefined
    pub fn evaluate(expression: &str, input: &Value) -> Result<Option<Value>, String> {
        let arena = Bump::new();
        let jsonata = JsonAta::new(expression, &arena).map_err(|e| e.to_string())?;
        let input = serde_json::to_string(input).map_err(|e| e.to_string())?;
        let result = jsonata
            .evaluate(Some(&input), None)
            .map_err(|e| e.to_string())?;
        if result.is_undefined() {
            return Ok(None);
        }
        serde_json::from_str(&result.serialize(false))
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[async_trait]
impl Scorer for JsonataScorer {
    async fn score(&self, dp: &EvalDataPoint) -> Result<Score, EvalError> {
        let invalid = |reason: String| EvalError::InvalidReference {
            test_case_id: dp.test_case_id.clone(),
            reason,
        };
        let expression = dp
            .require_reference()?
            .as_str()
            .ok_or_else(|| invalid("reference must be a JSONata expression string".to_string()))?;
        let output = dp.require_output()?;

        let result = Self::evaluate(expression, output).map_err(invalid)?;
        let Some(result) = result else {
            return Ok(Score {
                status: Some(EvalStatus::Fail),
                ..Default::default()
            });
        };

        let pass = is_truthy(&result);
        let value = match result {
            Value::Null => {
                return Ok(Score {
                    status: Some(EvalStatus::Fail),
                    ..Default::default()
                })
            }
            Value::Bool(b) => ScoreValue::Bool(b),
            Value::Number(n) => match n.as_f64() {
                Some(n) => ScoreValue::Number(n),
                None => ScoreValue::Text(n.to_string()),
            },
            other => ScoreValue::Text(value_to_text(&other)),
        };
        Ok(Score::passed(value, pass))
    }
}
