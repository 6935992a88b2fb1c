// SPDX-License-Identifier: MIT

//! Collaborator interfaces the phase graphs call out to
//!
//! Each collaborator returns raw model text; the calling node decodes it.
//! [`ModelCollaborators`] implements all of them on top of a [`Model`](crate::adk::model::Model).

mod model;

pub use model::{ModelCollaborators, CREATIVE_TEMPERATURE, DETERMINISTIC_TEMPERATURE};

use crate::adk::error::CallError;
use crate::casegen::types::{Case, DraftEntry, Finding, GenerationRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// The collaborators one case generation run calls
#[derive(Clone)]
pub struct CaseCollaborators {
    pub generator: Arc<dyn Generator>,
    pub voter: Arc<dyn Voter>,
    pub critic: Arc<dyn Critic>,
    pub refiners: RefinerRegistry,
}

impl CaseCollaborators {
    /// Every role served by the same model-backed collaborator
    pub fn from_model(collaborators: Arc<ModelCollaborators>) -> Self {
        Self {
            generator: collaborators.clone(),
            voter: collaborators.clone(),
            critic: collaborators.clone(),
            refiners: RefinerRegistry::new().with_fallback(collaborators),
        }
    }
}

/// Writes a candidate case
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        prior_case: Option<&Case>,
        prior_findings: &[Finding],
    ) -> Result<String, CallError>;
}

/// Picks one draft index
#[async_trait]
pub trait Voter: Send + Sync {
    async fn vote(
        &self,
        drafts: &[DraftEntry],
        request: &GenerationRequest,
    ) -> Result<String, CallError>;
}

/// Reports inconsistencies in a case
#[async_trait]
pub trait Critic: Send + Sync {
    async fn critique(&self, case: &Case, request: &GenerationRequest)
        -> Result<String, CallError>;
}

/// Rewrites one field of a case given the findings about it
#[async_trait]
pub trait FieldRefiner: Send + Sync {
    async fn refine(
        &self,
        field: &str,
        case: &Case,
        findings: &[Finding],
    ) -> Result<String, CallError>;
}

/// Translates labels and free text between languages
#[async_trait]
pub trait Translator: Send + Sync {
    /// Returns a JSON object mapping each source label to its translation
    async fn translate_labels(
        &self,
        labels: &[String],
        source: &str,
        target: &str,
    ) -> Result<String, CallError>;

    /// Returns the case with every free-text value translated
    async fn translate_case(
        &self,
        case: &Case,
        source: &str,
        target: &str,
    ) -> Result<String, CallError>;
}

/// Maps finding field tags to the refiner responsible for them
#[derive(Clone, Default)]
pub struct RefinerRegistry {
    refiners: HashMap<String, Arc<dyn FieldRefiner>>,
    fallback: Option<Arc<dyn FieldRefiner>>,
}

impl RefinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a refiner; a later registration for the same field wins
    pub fn register(mut self, field: &str, refiner: Arc<dyn FieldRefiner>) -> Self {
        self.refiners.insert(field.to_string(), refiner);
        self
    }

    /// Refiner for fields without a registration of their own
    pub fn with_fallback(mut self, refiner: Arc<dyn FieldRefiner>) -> Self {
        self.fallback = Some(refiner);
        self
    }

    pub fn get(&self, field: &str) -> Option<Arc<dyn FieldRefiner>> {
        self.refiners
            .get(field)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.refiners.contains_key(field) || self.fallback.is_some()
    }
}
