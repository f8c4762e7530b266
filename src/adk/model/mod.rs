// SPDX-License-Identifier: MIT

//! Model module - text generation and embedding traits
//!
//! Flows use a `Model` to generate text; judge-based evaluators use one as
//! the judge and an `Embedder` for similarity scoring. Implementations:
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI's API (or any compatible endpoint)

pub mod gemini;
pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models, never sent back
    Thinking(String),
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Core trait for text generation models
#[async_trait]
pub trait Model: Send + Sync {
    /// Human-readable model label, e.g. "gemini-1.5-flash"
    fn label(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

/// Text embedding models
#[async_trait]
pub trait Embedder: Send + Sync {
    fn label(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAI,
}

impl Provider {
    /// Pick a provider: `MODEL_PROVIDER` wins, otherwise infer from the name
    pub fn resolve(model_name: &str) -> Self {
        match env::var("MODEL_PROVIDER").ok().as_deref() {
            Some("OpenAI") | Some("openai") => Provider::OpenAI,
            Some("Gemini") | Some("gemini") => Provider::Gemini,
            _ => Self::infer(model_name),
        }
    }

    pub fn infer(model_name: &str) -> Self {
        if model_name.starts_with("gpt")
            || model_name.starts_with("o1")
            || model_name.starts_with("text-embedding-3")
            || model_name.starts_with("text-embedding-ada")
        {
            Provider::OpenAI
        } else {
            Provider::Gemini
        }
    }
}

/// Build a generation model from its name
pub fn model_from_name(model_name: &str) -> Result<Arc<dyn Model>, ModelError> {
    let provider = Provider::resolve(model_name);
    log::info!("Using provider: {:?} with model: {}", provider, model_name);
    let model: Arc<dyn Model> = match provider {
        Provider::OpenAI => Arc::new(openai::OpenAIModel::new(model_name.to_string())?),
        Provider::Gemini => Arc::new(gemini::GeminiModel::new(model_name.to_string())?),
    };
    Ok(model)
}

/// Build an embedder from its name
pub fn embedder_from_name(model_name: &str) -> Result<Arc<dyn Embedder>, ModelError> {
    let provider = Provider::resolve(model_name);
    log::info!("Using embedder: {:?} with model: {}", provider, model_name);
    let embedder: Arc<dyn Embedder> = match provider {
        Provider::OpenAI => Arc::new(openai::OpenAIModel::new(model_name.to_string())?),
        Provider::Gemini => Arc::new(gemini::GeminiModel::new(model_name.to_string())?),
    };
    Ok(embedder)
}
