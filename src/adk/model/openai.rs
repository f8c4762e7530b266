// SPDX-License-Identifier: MIT

//! OpenAI Model - Chat Completions and Embeddings API implementation

use super::{Content, Embedder, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

/// OpenAI model implementation, usable for generation and embedding
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ModelError::ApiKeyMissing("OpenAI".into()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ModelError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ModelError::api("OpenAI", text));
        }
        Ok(resp.json().await?)
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> Value {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect();
        json!({ "role": role, "content": text })
    }

    fn build_chat_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }
        body
    }

    /// Parse a chat completion response into Content
    fn parse_chat_response(response: &Value) -> Result<Content, ModelError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("No choices in OpenAI response".into()))?;

        let mut parts = Vec::new();
        if let Some(content) = choice["message"]["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }

    fn parse_embedding_response(response: &Value) -> Result<Vec<f32>, ModelError> {
        response["data"]
            .as_array()
            .and_then(|d| d.first())
            .and_then(|d| d["embedding"].as_array())
            .ok_or_else(|| ModelError::InvalidResponse("No embedding in OpenAI response".into()))?
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    ModelError::InvalidResponse(format!("Non-numeric embedding value {}", v))
                })
            })
            .collect()
    }
}

#[async_trait]
impl Model for OpenAIModel {
    fn label(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let body = self.build_chat_body(history, config);
        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp_json = self.post("chat/completions", &body).await?;
        log::debug!("OpenAI response: {}", resp_json);
        Self::parse_chat_response(&resp_json)
    }
}

#[async_trait]
impl Embedder for OpenAIModel {
    fn label(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let body = json!({ "model": self.model_name, "input": text });
        let resp_json = self.post("embeddings", &body).await?;
        Self::parse_embedding_response(&resp_json)
    }
}
