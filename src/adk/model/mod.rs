// SPDX-License-Identifier: MIT

//! Model module - defines the LLM model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI-compatible chat completions (OpenAI, Ollama, vLLM, ...)

pub mod gemini;
pub mod openai;

use crate::adk::error::CallError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Ask the provider for a JSON object response where supported
    #[serde(default)]
    pub json_output: bool,
}

impl GenerationConfig {
    /// Config with only a temperature set
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..Default::default()
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models
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

    /// Concatenated text parts; thinking parts are dropped
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

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider label used in errors and logs
    fn provider(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, CallError>;
}

/// Classify a transport error: connection and timeout failures are transient
pub(crate) fn classify_http_error(provider: &str, err: reqwest::Error) -> CallError {
    if err.is_connect() || err.is_timeout() {
        CallError::transient(provider, err.to_string())
    } else {
        CallError::api(provider, err.to_string())
    }
}

/// Classify a non-success HTTP status: rate limits and server errors are transient
pub(crate) fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> CallError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CallError::transient(provider, format!("{}: {}", status, body))
    } else {
        CallError::api(provider, format!("{}: {}", status, body))
    }
}

/// Infer the provider from the model name prefix
pub fn infer_provider_from_model(model_name: &str) -> String {
    let name_lower = model_name.to_lowercase();
    if name_lower.starts_with("gemini") || name_lower.starts_with("models/gemini") {
        "Gemini".to_string()
    } else if name_lower.starts_with("gpt") || name_lower.starts_with("o1") {
        "OpenAI".to_string()
    } else {
        // Local models are served through Ollama
        "Ollama".to_string()
    }
}

/// Create a model instance for a provider name (case-insensitive);
/// an empty provider is inferred from the model name
pub fn create_model(provider: &str, model_name: &str) -> Result<Arc<dyn Model>, CallError> {
    let provider = if provider.trim().is_empty() {
        infer_provider_from_model(model_name)
    } else {
        provider.to_string()
    };
    log::debug!("Using provider '{}' with model '{}'", provider, model_name);

    match provider.to_lowercase().as_str() {
        "gemini" | "google" => Ok(Arc::new(gemini::GeminiModel::new(model_name.to_string())?)),
        "openai" => Ok(Arc::new(openai::OpenAIModel::new(model_name.to_string())?)),
        "ollama" => Ok(Arc::new(openai::OpenAIModel::ollama(model_name.to_string()))),
        other => Err(CallError::api(other, "Unknown model provider")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_provider_gemini() {
        assert_eq!(infer_provider_from_model("gemini-2.0-flash"), "Gemini");
        assert_eq!(infer_provider_from_model("Gemini-2.0-Flash"), "Gemini");
        assert_eq!(
            infer_provider_from_model("models/gemini-2.0-flash"),
            "Gemini"
        );
    }

    #[test]
    fn test_infer_provider_openai() {
        assert_eq!(infer_provider_from_model("gpt-4o"), "OpenAI");
        assert_eq!(infer_provider_from_model("GPT-4"), "OpenAI");
        assert_eq!(infer_provider_from_model("o1-mini"), "OpenAI");
    }

    #[test]
    fn test_infer_provider_unknown_defaults_to_ollama() {
        assert_eq!(infer_provider_from_model("llama3.1:8b"), "Ollama");
        assert_eq!(
            infer_provider_from_model("hf.co/mradermacher/JSL-MedQwen-14b-reasoning-i1-GGUF"),
            "Ollama"
        );
        assert_eq!(infer_provider_from_model(""), "Ollama");
    }

    #[test]
    fn test_empty_provider_is_inferred() {
        let model = create_model("", "llama3.1:8b").unwrap();
        assert_eq!(model.provider(), "Ollama");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = create_model("carrier-pigeon", "x");
        assert!(matches!(result, Err(CallError::Api { .. })));
    }

    #[test]
    fn test_content_text_skips_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("hmm".to_string()),
                Part::Text("{\"a\":".to_string()),
                Part::Text("1}".to_string()),
            ],
        };
        assert_eq!(content.text(), "{\"a\":1}");
    }

    #[test]
    fn test_status_classification() {
        let transient = classify_status("ollama", reqwest::StatusCode::SERVICE_UNAVAILABLE, "busy");
        assert!(matches!(transient, CallError::Transient { .. }));

        let limited = classify_status("ollama", reqwest::StatusCode::TOO_MANY_REQUESTS, "slow");
        assert!(matches!(limited, CallError::Transient { .. }));

        let api = classify_status("ollama", reqwest::StatusCode::BAD_REQUEST, "bad");
        assert!(matches!(api, CallError::Api { .. }));
    }
}
