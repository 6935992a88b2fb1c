// SPDX-License-Identifier: MIT

//! Request and artifact types exchanged with collaborators

use crate::adk::error::CasegenError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Fields generated when a request names none
pub const DEFAULT_FIELDS: [&str; 2] = ["chiefComplaint", "anamnesis"];

fn default_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// What the caller wants generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Diagnosis the case is built around
    #[serde(alias = "diagnosis")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icd_code: Option<String>,
    /// Free-text context passed to every collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Case fields to generate
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    /// Output language; `None` keeps the source language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Anamnesis categories the case should cover
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl GenerationRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            icd_code: None,
            context: None,
            fields: default_fields(),
            language: None,
            categories: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Reject requests the pipeline cannot act on
    pub fn validate(&self) -> Result<(), CasegenError> {
        if self.target.trim().is_empty() {
            return Err(CasegenError::invalid_request("target must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(CasegenError::invalid_request("at least one field is required"));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.trim().is_empty() {
                return Err(CasegenError::invalid_request("field names must not be empty"));
            }
            if !seen.insert(field.as_str()) {
                return Err(CasegenError::invalid_request(format!(
                    "field '{}' requested twice",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// A generated case: top-level keys are case fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Case(Map<String, Value>);

impl Case {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field names in insertion order
    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Case {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One generated draft tagged with its fan-out branch index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEntry {
    pub draft_index: usize,
    pub case: Case,
}

/// A single council ballot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Index of the preferred draft
    pub draft_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// An inconsistency the critic found in one case field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    /// Case field the finding is about
    pub field: String,
    pub description: String,
    /// Suggested fix
    pub suggestion: String,
    pub severity: Severity,
}

/// Critic output envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FindingReport {
    #[serde(default)]
    pub inconsistencies: Vec<Finding>,
}
