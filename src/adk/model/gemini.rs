// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{classify_http_error, classify_status, Content, GenerationConfig, Model, Part};
use crate::adk::error::CallError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

const PROVIDER: &str = "Gemini";

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Requires `GOOGLE_API_KEY` environment variable to be set.
    pub fn new(model_name: String) -> Result<Self, CallError> {
        let api_key =
            env::var("GOOGLE_API_KEY").map_err(|_| CallError::ApiKeyMissing(PROVIDER.into()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
        })
    }

    fn request_body(history: &[Content], config: Option<&GenerationConfig>) -> serde_json::Value {
        // System turns go into systemInstruction; Gemini only knows user/model roles
        let system: Vec<serde_json::Value> = history
            .iter()
            .filter(|c| c.role == "system")
            .flat_map(|c| c.parts.iter().filter_map(part_to_gemini_json))
            .collect();

        let contents: Vec<serde_json::Value> = history
            .iter()
            .filter(|c| c.role != "system")
            .map(|c| {
                let parts: Vec<serde_json::Value> =
                    c.parts.iter().filter_map(part_to_gemini_json).collect();
                json!({ "role": c.role, "parts": parts })
            })
            .collect();

        let mut body = json!({
            "contents": contents
        });

        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": system });
        }

        if let Some(cfg) = config {
            let mut generation = json!({});
            if let Some(temp) = cfg.temperature {
                generation["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                generation["maxOutputTokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                generation["topP"] = json!(top_p);
            }
            if cfg.json_output {
                generation["responseMimeType"] = json!("application/json");
            }
            body["generationConfig"] = generation;
        }

        body
    }

    fn parse_response(resp_json: &serde_json::Value) -> Result<Content, CallError> {
        let candidate = resp_json["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| CallError::api(PROVIDER, "No candidates in response"))?;

        if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
            log::debug!("Gemini finish reason: {}", finish_reason);
            if finish_reason == "SAFETY" {
                return Err(CallError::api(
                    PROVIDER,
                    "Gemini blocked response due to safety filters.",
                ));
            }
        }

        let parts_json = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                log::error!("No content parts in candidate: {}", candidate);
                CallError::api(PROVIDER, "No content in Gemini response")
            })?;

        Ok(Content {
            role: "model".to_string(),
            parts: parts_json.iter().flat_map(parse_gemini_part).collect(),
        })
    }
}

#[async_trait]
impl Model for GeminiModel {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, CallError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model_name, self.api_key
        );
        let body = Self::request_body(history, config);

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_http_error(PROVIDER, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &text));
        }

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| classify_http_error(PROVIDER, e))?;
        log::debug!("Gemini response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}

/// Serialize a Part to Gemini API JSON format
/// Returns None for parts that shouldn't be sent (e.g., Thinking)
pub fn part_to_gemini_json(part: &Part) -> Option<serde_json::Value> {
    match part {
        Part::Text(t) => Some(json!({ "text": t })),
        Part::Thinking(_) => None,
    }
}

/// Parse a Gemini API JSON part into Parts
pub fn parse_gemini_part(p: &serde_json::Value) -> Vec<Part> {
    let mut parts = Vec::new();

    if let Some(thought) = p.get("thought").and_then(|t| t.as_str()) {
        if !thought.is_empty() {
            parts.push(Part::Thinking(thought.to_string()));
        }
    }

    if let Some(text) = p["text"].as_str() {
        parts.push(Part::Text(text.to_string()));
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_text_part() {
        let part = Part::Text("Hello world".to_string());
        let json = part_to_gemini_json(&part).unwrap();
        assert_eq!(json, json!({ "text": "Hello world" }));
    }

    #[test]
    fn test_serialize_thinking_part_returns_none() {
        let part = Part::Thinking("Internal reasoning".to_string());
        assert!(part_to_gemini_json(&part).is_none());
    }

    #[test]
    fn test_parse_thinking_part() {
        let json = json!({ "thought": "Let me think about this..." });
        let parts = parse_gemini_part(&json);

        assert_eq!(parts.len(), 1);
        match &parts[0] {
            Part::Thinking(t) => assert_eq!(t, "Let me think about this..."),
            _ => panic!("Expected Thinking part"),
        }
    }

    #[test]
    fn test_parse_empty_thought_ignored() {
        let json = json!({ "thought": "", "text": "Hello" });
        let parts = parse_gemini_part(&json);

        assert_eq!(parts.len(), 1);
        match &parts[0] {
            Part::Text(t) => assert_eq!(t, "Hello"),
            _ => panic!("Expected Text part"),
        }
    }

    #[test]
    fn test_system_turns_become_system_instruction() {
        let history = [
            Content::system("Answer in JSON"),
            Content::user("Generate a case"),
        ];
        let config = GenerationConfig {
            temperature: Some(0.8),
            json_output: true,
            ..Default::default()
        };
        let body = GeminiModel::request_body(&history, Some(&config));

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Answer in JSON");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_parse_response_collects_text() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"field\":" }, { "text": "\"x\"}" }] },
                "finishReason": "STOP"
            }]
        });
        let content = GeminiModel::parse_response(&resp).unwrap();
        assert_eq!(content.text(), "{\"field\":\"x\"}");
    }

    #[test]
    fn test_safety_block_is_api_error() {
        let resp = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert!(matches!(
            GeminiModel::parse_response(&resp),
            Err(CallError::Api { .. })
        ));
    }
}
