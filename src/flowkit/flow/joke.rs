//! Sample flow: ask a model for a joke about a subject

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Flow, FlowContext};
use crate::adk::error::FlowkitError;
use crate::adk::model::{Content, Model};

pub struct JokeFlow {
    model: Arc<dyn Model>,
}

impl JokeFlow {
    pub const NAME: &'static str = "jokeFlow";

    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Flow for JokeFlow {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: &mut FlowContext, input: Value) -> Result<Value, FlowkitError> {
        let subject = input
            .as_str()
            .ok_or_else(|| FlowkitError::flow(Self::NAME, "input must be a string subject"))?
            .to_string();
        let model = self.model.clone();

        let joke: String = ctx
            .run_step("call-llm", || async move {
                let prompt = format!("Tell a joke about {}.", subject);
                let response = model.generate_content(&[Content::user(prompt)], None).await?;
                Ok::<_, FlowkitError>(format!("From {}: {}", model.label(), response.text()))
            })
            .await?;

        Ok(Value::String(joke))
    }
}
