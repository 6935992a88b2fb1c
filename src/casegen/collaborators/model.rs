// SPDX-License-Identifier: MIT

//! Collaborators backed by an LLM

use super::{Critic, FieldRefiner, Generator, Translator, Voter};
use crate::adk::error::CallError;
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::casegen::decode::encode;
use crate::casegen::types::{Case, DraftEntry, Finding, FindingReport, GenerationRequest, Vote};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use schemars::schema_for;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Temperature for drafting
pub const CREATIVE_TEMPERATURE: f32 = 0.8;
/// Temperature for voting, critique, refinement and translation
pub const DETERMINISTIC_TEMPERATURE: f32 = 0.1;

static VOTE_SCHEMA: Lazy<String> = Lazy::new(|| pretty(&schema_for!(Vote)));
static FINDINGS_SCHEMA: Lazy<String> = Lazy::new(|| pretty(&schema_for!(FindingReport)));

fn pretty<T: Serialize>(value: &T) -> String {
    encode(value).unwrap_or_default()
}

/// Diagnosis line shared by every case-level prompt
fn describe_request(request: &GenerationRequest) -> String {
    let mut text = format!("Diagnosis: {}", request.target);
    if let Some(icd) = &request.icd_code {
        text.push_str(&format!(" (ICD {})", icd));
    }
    if let Some(context) = &request.context {
        text.push_str(&format!("\nAdditional context: {}", context));
    }
    if !request.categories.is_empty() {
        text.push_str(&format!(
            "\nAnamnesis categories to cover: {}",
            request.categories.join(", ")
        ));
    }
    text
}

/// Every collaborator role on top of one model
pub struct ModelCollaborators {
    model: Arc<dyn Model>,
    creative: GenerationConfig,
    deterministic: GenerationConfig,
}

impl ModelCollaborators {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self::with_temperatures(model, CREATIVE_TEMPERATURE, DETERMINISTIC_TEMPERATURE)
    }

    pub fn with_temperatures(model: Arc<dyn Model>, creative: f32, deterministic: f32) -> Self {
        let json_config = |temperature| GenerationConfig {
            json_output: true,
            ..GenerationConfig::with_temperature(temperature)
        };
        Self {
            model,
            creative: json_config(creative),
            deterministic: json_config(deterministic),
        }
    }

    async fn complete(
        &self,
        system: String,
        user: String,
        config: &GenerationConfig,
    ) -> Result<String, CallError> {
        log::debug!("[{}] Prompt:\n{}\n{}", self.model.provider(), system, user);
        let history = [Content::system(system), Content::user(user)];
        let response = self.model.generate_content(&history, Some(config)).await?;
        let text = response.text();
        log::debug!("[{}] Response:\n{}", self.model.provider(), text);
        Ok(text)
    }
}

#[async_trait]
impl Generator for ModelCollaborators {
    async fn generate(
        &self,
        request: &GenerationRequest,
        prior_case: Option<&Case>,
        prior_findings: &[Finding],
    ) -> Result<String, CallError> {
        let properties: serde_json::Map<String, serde_json::Value> = request
            .fields
            .iter()
            .map(|f| (f.clone(), json!({})))
            .collect();
        let case_schema = json!({
            "type": "object",
            "required": request.fields,
            "properties": properties,
        });

        let mut system = format!(
            "You are a medical education expert creating realistic patient cases for medical \
             students.\nThe case must contain these fields: {}.\n\
             Answer with a single JSON object matching this schema:\n{}\n",
            request.fields.join(", "),
            pretty(&case_schema)
        );
        if let Some(case) = prior_case {
            system.push_str(&format!(
                "\nPrevious case generated:\n{}\nwith inconsistencies:\n{}\n",
                pretty(case),
                pretty(&prior_findings)
            ));
        }
        system.push_str(
            "\nRequirements:\n- Be medically accurate and realistic\n\
             - Do NOT directly reveal the diagnosis\n\
             - Use standard medical terminology\n\
             - Return ONLY JSON, no additional text",
        );

        self.complete(system, describe_request(request), &self.creative)
            .await
    }
}

#[async_trait]
impl Voter for ModelCollaborators {
    async fn vote(
        &self,
        drafts: &[DraftEntry],
        request: &GenerationRequest,
    ) -> Result<String, CallError> {
        let system = format!(
            "You are a senior medical educator picking the best case draft among several \
             options.\nSelect the case that is most appropriate, complete and consistent.\n\
             Answer with JSON matching this schema:\n{}",
            *VOTE_SCHEMA
        );
        let user = format!(
            "{}\n\nDrafts to choose from:\n{}",
            describe_request(request),
            pretty(&drafts)
        );
        self.complete(system, user, &self.deterministic).await
    }
}

#[async_trait]
impl Critic for ModelCollaborators {
    async fn critique(
        &self,
        case: &Case,
        request: &GenerationRequest,
    ) -> Result<String, CallError> {
        let system = format!(
            "You are a medical quality assurance expert validating a patient case for \
             educational use.\n\nCase to validate:\n{}\n\n\
             Check whether the diagnosis is revealed directly and whether all entries are \
             internally consistent. Only flag genuine medical or logical inconsistencies; \
             tag each with the case field it concerns.\n\
             Answer with JSON matching this schema:\n{}",
            pretty(case),
            *FINDINGS_SCHEMA
        );
        self.complete(system, describe_request(request), &self.deterministic)
            .await
    }
}

#[async_trait]
impl FieldRefiner for ModelCollaborators {
    async fn refine(
        &self,
        field: &str,
        case: &Case,
        findings: &[Finding],
    ) -> Result<String, CallError> {
        let system = format!(
            "You are a medical education expert fixing one field of a patient case.\n\
             Case:\n{}\n\nInconsistencies found in '{}':\n{}\n\n\
             Rewrite only '{}' so that every inconsistency is resolved and the rest of the \
             case stays consistent. Answer with a JSON object whose single key is '{}'.",
            pretty(case),
            field,
            pretty(&findings),
            field,
            field
        );
        let user = format!("Refine the field '{}'.", field);
        self.complete(system, user, &self.deterministic).await
    }
}

#[async_trait]
impl Translator for ModelCollaborators {
    async fn translate_labels(
        &self,
        labels: &[String],
        source: &str,
        target: &str,
    ) -> Result<String, CallError> {
        let system = format!(
            "You are a medical translator. Translate each {} label to {}.\n\
             Answer with a JSON object mapping every original label to its translation.",
            source, target
        );
        self.complete(system, pretty(&labels), &self.deterministic)
            .await
    }

    async fn translate_case(
        &self,
        case: &Case,
        source: &str,
        target: &str,
    ) -> Result<String, CallError> {
        let system = format!(
            "You are a medical translator. Translate every free-text value of this case from \
             {} to {}.\nKeep all keys, the structure, numbers and already translated labels \
             unchanged. Answer with the translated case as JSON.",
            source, target
        );
        self.complete(system, pretty(case), &self.deterministic)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Part;
    use std::sync::Mutex;

    /// Model that records its last history and config
    struct RecordingModel {
        reply: String,
        seen: Mutex<Vec<(Vec<Content>, Option<GenerationConfig>)>>,
    }

    impl RecordingModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> (Vec<Content>, Option<GenerationConfig>) {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Model for RecordingModel {
        fn provider(&self) -> &str {
            "mock"
        }

        async fn generate_content(
            &self,
            history: &[Content],
            config: Option<&GenerationConfig>,
        ) -> Result<Content, CallError> {
            self.seen
                .lock()
                .unwrap()
                .push((history.to_vec(), config.cloned()));
            Ok(Content {
                role: "model".to_string(),
                parts: vec![Part::Text(self.reply.clone())],
            })
        }
    }

    fn request() -> GenerationRequest {
        let mut request = GenerationRequest::new("Appendicitis");
        request.icd_code = Some("K35".to_string());
        request.context = Some("ER setting".to_string());
        request
    }

    #[tokio::test]
    async fn test_generate_uses_creative_temperature_and_prior_case() {
        let model = RecordingModel::new("{}");
        let collaborators = ModelCollaborators::new(model.clone());
        let prior = Case::new().with("anamnesis", json!(["old"]));

        let reply = collaborators
            .generate(&request(), Some(&prior), &[])
            .await
            .unwrap();
        assert_eq!(reply, "{}");

        let (history, config) = model.last();
        let config = config.unwrap();
        assert_eq!(config.temperature, Some(CREATIVE_TEMPERATURE));
        assert!(config.json_output);
        assert!(history[0].text().contains("Previous case generated"));
        assert!(history[0].text().contains("chiefComplaint"));
        assert!(history[1].text().contains("K35"));
        assert!(history[1].text().contains("ER setting"));
    }

    #[tokio::test]
    async fn test_vote_and_critique_are_deterministic() {
        let model = RecordingModel::new("{\"draftIndex\": 0}");
        let collaborators = ModelCollaborators::new(model.clone());

        collaborators.vote(&[], &request()).await.unwrap();
        let (history, config) = model.last();
        assert_eq!(config.unwrap().temperature, Some(DETERMINISTIC_TEMPERATURE));
        assert!(history[0].text().contains("draftIndex"));

        collaborators.critique(&Case::new(), &request()).await.unwrap();
        let (history, _) = model.last();
        assert!(history[0].text().contains("inconsistencies"));
    }

    #[tokio::test]
    async fn test_refine_names_field() {
        let model = RecordingModel::new("{\"anamnesis\": []}");
        let collaborators = ModelCollaborators::new(model.clone());

        collaborators
            .refine("anamnesis", &Case::new(), &[])
            .await
            .unwrap();
        let (history, _) = model.last();
        assert!(history[1].text().contains("anamnesis"));
    }

    #[test]
    fn test_schemas_render() {
        assert!(VOTE_SCHEMA.contains("draftIndex"));
        assert!(FINDINGS_SCHEMA.contains("severity"));
    }
}
