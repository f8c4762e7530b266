// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{Content, Embedder, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini model implementation, usable for generation and embedding
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Requires `GOOGLE_API_KEY` environment variable to be set.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key =
            env::var("GOOGLE_API_KEY").map_err(|_| ModelError::ApiKeyMissing("Gemini".into()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
        })
    }

    async fn post(&self, method: &str, body: &Value) -> Result<Value, ModelError> {
        let url = format!(
            "{}/{}:{}?key={}",
            API_BASE, self.model_name, method, self.api_key
        );
        let resp = self.client.post(&url).json(body).send().await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ModelError::api("Gemini", text));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Model for GeminiModel {
    fn label(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let body = build_generate_body(history, config);
        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp_json = self.post("generateContent", &body).await?;
        log::debug!("Gemini response: {}", resp_json);
        parse_generate_response(&resp_json)
    }
}

#[async_trait]
impl Embedder for GeminiModel {
    fn label(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let body = json!({ "content": { "parts": [{ "text": text }] } });
        let resp_json = self.post("embedContent", &body).await?;
        parse_embedding(&resp_json)
    }
}

/// Build a `generateContent` body.
///
/// System messages go to `systemInstruction`; Gemini rejects a "system" role
/// inside `contents`.
pub fn build_generate_body(history: &[Content], config: Option<&GenerationConfig>) -> Value {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for c in history {
        let parts: Vec<Value> = c.parts.iter().filter_map(part_to_gemini_json).collect();
        if parts.is_empty() {
            continue;
        }
        match c.role.as_str() {
            "system" => system_parts.extend(parts),
            "model" | "assistant" => contents.push(json!({ "role": "model", "parts": parts })),
            _ => contents.push(json!({ "role": "user", "parts": parts })),
        }
    }

    let mut body = json!({ "contents": contents });
    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({ "parts": system_parts });
    }

    if let Some(cfg) = config {
        let mut generation = serde_json::Map::new();
        if let Some(t) = cfg.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(m) = cfg.max_output_tokens {
            generation.insert("maxOutputTokens".into(), json!(m));
        }
        if let Some(p) = cfg.top_p {
            generation.insert("topP".into(), json!(p));
        }
        if let Some(k) = cfg.top_k {
            generation.insert("topK".into(), json!(k));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
    }

    body
}

/// Parse a `generateContent` response into Content
pub fn parse_generate_response(resp_json: &Value) -> Result<Content, ModelError> {
    let candidate = resp_json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| ModelError::InvalidResponse("No candidates in response".into()))?;

    if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        log::debug!("Gemini finish reason: {}", finish_reason);
        if finish_reason == "SAFETY" {
            return Err(ModelError::InvalidResponse(
                "Gemini blocked response due to safety filters.".into(),
            ));
        }
    }

    let parts_json = candidate["content"]["parts"].as_array().ok_or_else(|| {
        log::error!("No parts in candidate. Full response: {}", resp_json);
        ModelError::InvalidResponse(format!("No content in Gemini response: {}", candidate))
    })?;

    Ok(Content {
        role: "model".to_string(),
        parts: parts_json.iter().flat_map(parse_gemini_part).collect(),
    })
}

/// Parse an `embedContent` response
pub fn parse_embedding(resp_json: &Value) -> Result<Vec<f32>, ModelError> {
    resp_json["embedding"]["values"]
        .as_array()
        .ok_or_else(|| ModelError::InvalidResponse("No embedding values in response".into()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ModelError::InvalidResponse(format!("Non-numeric embedding value {}", v)))
        })
        .collect()
}

/// Serialize a Part to Gemini API JSON format
/// Returns None for parts that shouldn't be sent (e.g., Thinking)
pub fn part_to_gemini_json(part: &Part) -> Option<Value> {
    match part {
        Part::Text(t) => Some(json!({ "text": t })),
        Part::Thinking(_) => None,
    }
}

/// Parse a Gemini API JSON part into Parts
pub fn parse_gemini_part(p: &Value) -> Vec<Part> {
    let mut parts = Vec::new();

    if p.get("thought").and_then(|t| t.as_bool()) == Some(true) {
        if let Some(text) = p["text"].as_str() {
            parts.push(Part::Thinking(text.to_string()));
        }
        return parts;
    }

    if let Some(text) = p["text"].as_str() {
        parts.push(Part::Text(text.to_string()));
    }
    parts
}
