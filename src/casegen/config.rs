// SPDX-License-Identifier: MIT

//! Settings: defaults, then an optional YAML file, then environment overrides

use crate::adk::error::CasegenError;
use crate::adk::retry::RetryPolicy;
use crate::casegen::collaborators::{CREATIVE_TEMPERATURE, DETERMINISTIC_TEMPERATURE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub pipeline: PipelineOptions,
}

/// Which model serves the collaborators
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_creative_temperature")]
    pub creative_temperature: f32,
    #[serde(default = "default_deterministic_temperature")]
    pub deterministic_temperature: f32,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model_name() -> String {
    "hf.co/mradermacher/JSL-MedQwen-14b-reasoning-i1-GGUF:Q4_K_S".to_string()
}

fn default_creative_temperature() -> f32 {
    CREATIVE_TEMPERATURE
}

fn default_deterministic_temperature() -> f32 {
    DETERMINISTIC_TEMPERATURE
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            creative_temperature: default_creative_temperature(),
            deterministic_temperature: default_deterministic_temperature(),
        }
    }
}

/// Pipeline sizes, budgets and limits
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineOptions {
    /// Parallel drafts per pass
    #[serde(default = "default_three")]
    pub draft_count: u32,
    /// Council voters; 1 or less skips voting
    #[serde(default = "default_three")]
    pub council_size: u32,
    /// Consistency loop counter, decremented before each critique
    #[serde(default = "default_two")]
    pub refinement_budget: u32,
    /// Outer Draft -> Council -> Consistency passes
    #[serde(default = "default_two")]
    pub loop_budget: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Step limit floor; the looping graphs raise it to what their budgets need
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Language collaborators write in
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default)]
    pub translation: TranslationFields,
}

fn default_three() -> u32 {
    3
}

fn default_two() -> u32 {
    2
}

fn default_max_steps() -> u32 {
    crate::casegen::workflow::graph::DEFAULT_MAX_STEPS
}

fn default_source_language() -> String {
    "English".to_string()
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            draft_count: default_three(),
            council_size: default_three(),
            refinement_budget: default_two(),
            loop_budget: default_two(),
            retry: RetryPolicy::default(),
            max_steps: default_max_steps(),
            source_language: default_source_language(),
            translation: TranslationFields::default(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), CasegenError> {
        if self.max_steps == 0 {
            return Err(CasegenError::config("max_steps must be at least 1"));
        }
        if self.source_language.trim().is_empty() {
            return Err(CasegenError::config("source_language must not be empty"));
        }
        Ok(())
    }
}

/// A string label stored under `key` in each object of the array field `field`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LabelPath {
    pub field: String,
    pub key: String,
}

/// Which case values translate through the lookup table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TranslationFields {
    /// Categorical labels, e.g. each `anamnesis[].category`
    #[serde(default = "default_labels")]
    pub labels: Vec<LabelPath>,
    /// Fields holding lists of short strings
    #[serde(default = "default_lists")]
    pub lists: Vec<String>,
}

fn default_labels() -> Vec<LabelPath> {
    vec![LabelPath {
        field: "anamnesis".to_string(),
        key: "category".to_string(),
    }]
}

fn default_lists() -> Vec<String> {
    vec!["symptoms".to_string()]
}

impl Default for TranslationFields {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            lists: default_lists(),
        }
    }
}

impl Settings {
    /// Parse settings from YAML
    pub fn parse_yaml(content: &str) -> Result<Self, CasegenError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Defaults or the YAML file at `path`, then process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, CasegenError> {
        let mut settings = match path {
            Some(path) => {
                log::info!("Loading settings from {}", path.display());
                Self::parse_yaml(&fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.pipeline.validate()?;
        Ok(settings)
    }

    /// Apply overrides from `lookup` (environment variable name to value)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), CasegenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("MODEL_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(name) = lookup("MODEL_NAME") {
            self.model.name = name;
        }

        let pipeline = &mut self.pipeline;
        override_parsed(&lookup, "CASEGEN_DRAFT_COUNT", &mut pipeline.draft_count)?;
        override_parsed(&lookup, "CASEGEN_COUNCIL_SIZE", &mut pipeline.council_size)?;
        override_parsed(&lookup, "CASEGEN_REFINEMENT_BUDGET", &mut pipeline.refinement_budget)?;
        override_parsed(&lookup, "CASEGEN_LOOP_BUDGET", &mut pipeline.loop_budget)?;
        override_parsed(&lookup, "CASEGEN_MAX_STEPS", &mut pipeline.max_steps)?;
        override_parsed(&lookup, "CASEGEN_MAX_RETRIES", &mut pipeline.retry.max_retries)?;
        override_parsed(
            &lookup,
            "CASEGEN_RETRY_BASE_DELAY_MS",
            &mut pipeline.retry.base_delay_ms,
        )?;
        if let Some(language) = lookup("CASEGEN_SOURCE_LANGUAGE") {
            pipeline.source_language = language;
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), CasegenError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| CasegenError::config(format!("{} has invalid value '{}'", key, raw)))?;
    }
    Ok(())
}
