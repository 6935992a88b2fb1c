// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation
//!
//! Also drives OpenAI-compatible servers; [`OpenAIModel::ollama`] targets a
//! local Ollama instance.

use super::{classify_http_error, classify_status, Content, GenerationConfig, Model, Part};
use crate::adk::error::CallError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// OpenAI-compatible chat model implementation
pub struct OpenAIModel {
    client: Client,
    provider: String,
    api_key: Option<String>,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, CallError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| CallError::ApiKeyMissing("OpenAI".into()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            provider: "OpenAI".to_string(),
            api_key: Some(api_key),
            model_name,
            base_url,
        })
    }

    /// Create a model served by Ollama's OpenAI-compatible endpoint
    ///
    /// Uses `OLLAMA_BASE_URL` (default `http://localhost:11434/v1`); no key needed.
    pub fn ollama(model_name: String) -> Self {
        let base_url = env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434/v1".to_string());

        Self {
            client: Client::new(),
            provider: "Ollama".to_string(),
            api_key: env::var("OLLAMA_API_KEY").ok(),
            model_name,
            base_url,
        }
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> serde_json::Value {
        let role = match content.role.as_str() {
            "system" => "system",
            "user" => "user",
            "model" => "assistant",
            other => other,
        };

        json!({
            "role": role,
            "content": content.text()
        })
    }

    /// Build the request body for a history and optional config
    fn request_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = history
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
            if cfg.json_output {
                body["response_format"] = json!({ "type": "json_object" });
            }
        }

        body
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(
        provider: &str,
        response: &serde_json::Value,
    ) -> Result<Content, CallError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| CallError::api(provider, "No choices in response"))?;

        let message = &choice["message"];
        let mut parts = Vec::new();

        // Reasoning models served by Ollama expose their chain separately
        if let Some(reasoning) = message["reasoning_content"].as_str() {
            if !reasoning.is_empty() {
                parts.push(Part::Thinking(reasoning.to_string()));
            }
        }

        if let Some(content) = message["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, CallError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(history, config);

        log::debug!(
            "{} request body: {}",
            self.provider,
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| classify_http_error(&self.provider, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(&self.provider, status, &text));
        }

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| classify_http_error(&self.provider, e))?;
        log::debug!("{} response: {}", self.provider, resp_json);

        Self::parse_openai_response(&self.provider, &resp_json)
    }
}
