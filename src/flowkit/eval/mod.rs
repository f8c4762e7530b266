// SPDX-License-Identifier: MIT

//! Evaluators - score flow outputs against references or a judge model
//!
//! [`configure_evaluators`] turns a list of metrics into evaluators by looking
//! each metric up in a strategy table of [`Scorer`]s:
//! - deterministic: `REGEX`, `DEEP_EQUAL`
//! - judge: `FAITHFULNESS`, `MALICIOUSNESS`, `ANSWER_RELEVANCY` (also needs an embedder)

mod dataset;
mod deterministic;
mod judge;
mod types;

pub use dataset::DatasetLoader;
pub use deterministic::{DeepEqualScorer, JsonataScorer, RegexScorer};
pub use judge::{
    cosine_similarity, extract_json, AnswerRelevancyScorer, FaithfulnessScorer, Judge,
    MaliciousnessScorer,
};
pub use types::{
    value_to_text, EvalDataPoint, EvalResponse, EvalStatus, Metric, Score, ScoreDetails,
    ScoreValue,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::adk::error::EvalError;
use crate::adk::model::{Embedder, GenerationConfig, Model};

pub const PLUGIN_NAME: &str = "flowkitEval";

/// Computes one score for one data point
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, dp: &EvalDataPoint) -> Result<Score, EvalError>;
}

/// A named evaluator that can be run over a dataset
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn definition(&self) -> &str;
    async fn evaluate(&self, dp: &EvalDataPoint) -> Result<EvalResponse, EvalError>;
}

/// Evaluator name for a metric, e.g. `flowkitEval/faithfulness`
pub fn evaluator_name(metric: Metric) -> String {
    format!("{}/{}", PLUGIN_NAME, metric.as_str().to_ascii_lowercase())
}

fn describe(metric: Metric) -> (&'static str, &'static str) {
    match metric {
        Metric::AnswerRelevancy => (
            "Answer Relevancy",
            "Assesses how pertinent the generated answer is to the given prompt",
        ),
        Metric::Faithfulness => (
            "Faithfulness",
            "Measures the factual consistency of the generated answer against the given context",
        ),
        Metric::Maliciousness => (
            "Maliciousness",
            "Measures whether the generated output intends to deceive, harm, or exploit",
        ),
        Metric::Regex => (
            "RegExp",
            "Tests output against the regexp provided as reference",
        ),
        Metric::DeepEqual => (
            "Deep Equals",
            "Tests equality of output against the provided reference",
        ),
        Metric::Jsonata => (
            "JSONata",
            "Tests JSONata expression (provided in reference) against output",
        ),
    }
}

/// Evaluator backed by the scorer registered for its metric
pub struct MetricEvaluator {
    metric: Metric,
    name: String,
    scorer: Box<dyn Scorer>,
}

impl MetricEvaluator {
    pub fn new(metric: Metric, scorer: Box<dyn Scorer>) -> Self {
        Self {
            metric,
            name: evaluator_name(metric),
            scorer,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }
}

#[async_trait]
impl Evaluator for MetricEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        describe(self.metric).0
    }

    fn definition(&self) -> &str {
        describe(self.metric).1
    }

    async fn evaluate(&self, dp: &EvalDataPoint) -> Result<EvalResponse, EvalError> {
        let evaluation = self.scorer.score(dp).await?;
        Ok(EvalResponse {
            test_case_id: dp.test_case_id.clone(),
            evaluation,
        })
    }
}

/// Metrics plus the models judge metrics need
#[derive(Clone, Default)]
pub struct EvalOptions {
    /// `None` selects maliciousness and faithfulness
    pub metrics: Option<Vec<Metric>>,
    pub judge: Option<Arc<dyn Model>>,
    pub judge_config: Option<GenerationConfig>,
    pub embedder: Option<Arc<dyn Embedder>>,
}

impl EvalOptions {
    pub const DEFAULT_METRICS: [Metric; 2] = [Metric::Maliciousness, Metric::Faithfulness];
}

/// Build one evaluator per requested metric
pub fn configure_evaluators(
    options: &EvalOptions,
) -> Result<Vec<Box<dyn Evaluator>>, EvalError> {
    let metrics = match &options.metrics {
        Some(metrics) => metrics.clone(),
        None => EvalOptions::DEFAULT_METRICS.to_vec(),
    };
    if options.embedder.is_none() && metrics.contains(&Metric::AnswerRelevancy) {
        return Err(EvalError::MissingEmbedder(
            Metric::AnswerRelevancy.to_string(),
        ));
    }

    let judge = options
        .judge
        .as_ref()
        .map(|model| Judge::new(model.clone(), options.judge_config.clone()));

    metrics
        .into_iter()
        .map(|metric| -> Result<Box<dyn Evaluator>, EvalError> {
            let scorer = scorer_for(metric, judge.as_ref(), options.embedder.as_ref())?;
            log::debug!("Configured evaluator {}", evaluator_name(metric));
            Ok(Box::new(MetricEvaluator::new(metric, scorer)))
        })
        .collect()
}

fn scorer_for(
    metric: Metric,
    judge: Option<&Judge>,
    embedder: Option<&Arc<dyn Embedder>>,
) -> Result<Box<dyn Scorer>, EvalError> {
    let require_judge = || {
        judge
            .cloned()
            .ok_or_else(|| EvalError::MissingJudge(metric.to_string()))
    };

    let scorer: Box<dyn Scorer> = match metric {
        Metric::Regex => Box::new(RegexScorer),
        Metric::DeepEqual => Box::new(DeepEqualScorer),
        Metric::Jsonata => Box::new(JsonataScorer),
        Metric::Faithfulness => Box::new(FaithfulnessScorer::new(require_judge()?)),
        Metric::Maliciousness => Box::new(MaliciousnessScorer::new(require_judge()?)),
        Metric::AnswerRelevancy => {
            let embedder = embedder
                .cloned()
                .ok_or_else(|| EvalError::MissingEmbedder(metric.to_string()))?;
            Box::new(AnswerRelevancyScorer::new(require_judge()?, embedder))
        }
    };
    Ok(scorer)
}

/// All responses produced by one evaluator over a dataset
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorRun {
    pub evaluator: String,
    pub responses: Vec<EvalResponse>,
}

/// Run every evaluator over every data point
///
/// A data point that fails to score gets a `Score` carrying the error rather
/// than aborting the run.
pub async fn run_evaluation(
    evaluators: &[Box<dyn Evaluator>],
    dataset: &[EvalDataPoint],
) -> Vec<EvaluatorRun> {
    let mut runs = Vec::with_capacity(evaluators.len());
    for evaluator in evaluators {
        log::info!(
            "Running {} over {} data points",
            evaluator.name(),
            dataset.len()
        );
        let mut responses = Vec::with_capacity(dataset.len());
        for dp in dataset {
            let response = match evaluator.evaluate(dp).await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!(
                        "{} failed on test case {}: {}",
                        evaluator.name(),
                        dp.test_case_id,
                        e
                    );
                    EvalResponse {
                        test_case_id: dp.test_case_id.clone(),
                        evaluation: Score::failed_with(e.to_string()),
                    }
                }
            };
            responses.push(response);
        }
        runs.push(EvaluatorRun {
            evaluator: evaluator.name().to_string(),
            responses,
        });
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::adk::model::Content;
    use serde_json::json;

    struct NullJudge;

    #[async_trait]
    impl Model for NullJudge {
        fn label(&self) -> &str {
            "null"
        }

        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            Ok(Content::model(r#"{"reason": "fine", "verdict": false}"#))
        }
    }

    fn names(evaluators: &[Box<dyn Evaluator>]) -> Vec<String> {
        evaluators.iter().map(|e| e.name().to_string()).collect()
    }

    #[test]
    fn test_default_metrics_need_judge() {
        let err = configure_evaluators(&EvalOptions::default()).err().unwrap();
        assert!(matches!(err, EvalError::MissingJudge(m) if m == "MALICIOUSNESS"));
    }

    #[test]
    fn test_default_metrics_with_judge() {
        let options = EvalOptions {
            judge: Some(Arc::new(NullJudge)),
            ..Default::default()
        };
        let evaluators = configure_evaluators(&options).unwrap();
        assert_eq!(
            names(&evaluators),
            vec!["flowkitEval/maliciousness", "flowkitEval/faithfulness"]
        );
        assert_eq!(evaluators[1].display_name(), "Faithfulness");
    }

    #[test]
    fn test_answer_relevancy_needs_embedder() {
        let options = EvalOptions {
            metrics: Some(vec![Metric::AnswerRelevancy]),
            judge: Some(Arc::new(NullJudge)),
            ..Default::default()
        };
        let err = configure_evaluators(&options).err().unwrap();
        assert!(matches!(err, EvalError::MissingEmbedder(_)));
    }

    #[test]
    fn test_deterministic_metrics_need_no_models() {
        let options = EvalOptions {
            metrics: Some(vec![Metric::Regex, Metric::DeepEqual, Metric::Jsonata]),
            ..Default::default()
        };
        let evaluators = configure_evaluators(&options).unwrap();
        assert_eq!(
            names(&evaluators),
            vec!["flowkitEval/regex", "flowkitEval/deep_equal", "flowkitEval/jsonata"]
        );
    }

    #[tokio::test]
    async fn test_run_evaluation_records_failures() {
        let options = EvalOptions {
            metrics: Some(vec![Metric::Regex]),
            ..Default::default()
        };
        let evaluators = configure_evaluators(&options).unwrap();
        let dataset = vec![
            EvalDataPoint::new("ok", json!("q"))
                .with_output(json!("hello"))
                .with_reference(json!("^hel")),
            EvalDataPoint::new("no-ref", json!("q")).with_output(json!("hello")),
        ];

        let runs = run_evaluation(&evaluators, &dataset).await;

        assert_eq!(runs.len(), 1);
        let responses = &runs[0].responses;
        assert_eq!(responses[0].evaluation.status, Some(EvalStatus::Pass));
        assert_eq!(responses[1].test_case_id, "no-ref");
        assert!(responses[1].evaluation.score.is_none());
        assert!(responses[1]
            .evaluation
            .error
            .as_deref()
            .unwrap()
            .contains("no reference"));
    }

    #[tokio::test]
    async fn test_maliciousness_evaluator_with_judge() {
        let options = EvalOptions {
            metrics: Some(vec![Metric::Maliciousness]),
            judge: Some(Arc::new(NullJudge)),
            ..Default::default()
        };
        let evaluators = configure_evaluators(&options).unwrap();
        let dp = EvalDataPoint::new("t", json!("q")).with_output(json!("a"));

        let response = evaluators[0].evaluate(&dp).await.unwrap();
        assert_eq!(response.test_case_id, "t");
        assert_eq!(response.evaluation.score, Some(ScoreValue::Bool(false)));
    }
}
