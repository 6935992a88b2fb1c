// SPDX-License-Identifier: MIT

//! The case generation pipeline: Draft -> Council -> Consistency, looped
//!
//! ```text
//! START -> loop_entry -> draft_phase -> council_phase -> consistency_reset
//!              ^                                              |
//!              |                                              v
//!         draft_reset <-(findings left, passes left)- consistency_phase -> END
//! ```

use crate::adk::error::{CasegenError, WorkflowError};
use crate::adk::model::create_model;
use crate::casegen::collaborators::{CaseCollaborators, ModelCollaborators};
use crate::casegen::config::{PipelineOptions, Settings};
use crate::casegen::phases::{
    build_consistency_graph, build_council_graph, build_draft_graph, case_state_schema,
    consistency_step_limit, keys,
};
use crate::casegen::translation::{TranslationCache, TranslationPipeline};
use crate::casegen::types::{Case, Finding, GenerationRequest};
use crate::casegen::workflow::graph::{fn_node, router, Graph, GraphBuilder, END, START};
use crate::casegen::workflow::state::StateUpdate;
use serde_json::{json, Map};
use std::sync::Arc;
use uuid::Uuid;

pub const LOOP_ENTRY: &str = "loop_entry";
pub const DRAFT_PHASE: &str = "draft_phase";
pub const COUNCIL_PHASE: &str = "council_phase";
pub const CONSISTENCY_RESET: &str = "consistency_reset";
pub const CONSISTENCY_PHASE: &str = "consistency_phase";
pub const DRAFT_RESET: &str = "draft_reset";

/// Steps the pipeline graph takes at most for `loop_budget` passes
///
/// A pass is six steps; the last one skips `draft_reset` and `END` is free.
pub fn pipeline_step_limit(loop_budget: u32) -> u32 {
    loop_budget.max(1).saturating_mul(6).saturating_add(1)
}

/// Compose the phase graphs into the looping pipeline graph
///
/// `max_steps` is a floor; the looping graphs get at least what their
/// budgets need.
pub fn build_pipeline_graph(
    collaborators: &CaseCollaborators,
    options: &PipelineOptions,
) -> Result<Graph, WorkflowError> {
    let draft = build_draft_graph(
        collaborators.generator.clone(),
        options.retry,
        options.max_steps,
    )?;
    let council = build_council_graph(
        collaborators.voter.clone(),
        options.retry,
        options.max_steps,
    )?;
    let consistency = build_consistency_graph(
        collaborators.critic.clone(),
        collaborators.refiners.clone(),
        options.retry,
        consistency_step_limit(options.refinement_budget).max(options.max_steps),
    )?;

    let loop_entry = fn_node(|state| {
        let remaining = state.get_i64(keys::LOOP_REMAINING).unwrap_or(0) - 1;
        log::info!("[Pipeline] Starting pass, {} passes left after this one", remaining.max(0));
        Ok(StateUpdate::new().set(keys::LOOP_REMAINING, json!(remaining)))
    });

    let refinement_budget = options.refinement_budget;
    let consistency_reset = fn_node(move |_| {
        Ok(StateUpdate::new()
            .replace(keys::FINDINGS, json!([]))
            .replace(keys::REFINEMENT_REMAINING, json!(refinement_budget)))
    });

    let draft_reset = fn_node(|_| {
        log::info!("[Pipeline] Findings remain, drafting again");
        Ok(StateUpdate::new()
            .replace(keys::DRAFTS, json!([]))
            .replace(keys::VOTES, json!({})))
    });

    let loop_or_end = router(|state| {
        let findings: Vec<Finding> = state.get_typed(keys::FINDINGS)?.unwrap_or_default();
        let remaining = state.get_i64(keys::LOOP_REMAINING).unwrap_or(0);
        if !findings.is_empty() && remaining > 0 {
            return Ok(DRAFT_RESET.to_string());
        }
        if !findings.is_empty() {
            log::warn!(
                "[Pipeline] Pass budget spent with {} unresolved findings",
                findings.len()
            );
        }
        Ok(END.to_string())
    });

    GraphBuilder::new("pipeline", case_state_schema())
        .add_node(LOOP_ENTRY, loop_entry)
        .add_node(DRAFT_PHASE, Arc::new(draft))
        .add_node(COUNCIL_PHASE, Arc::new(council))
        .add_node(CONSISTENCY_RESET, consistency_reset)
        .add_node(CONSISTENCY_PHASE, Arc::new(consistency))
        .add_node(DRAFT_RESET, draft_reset)
        .add_edge(START, LOOP_ENTRY)
        .add_edge(LOOP_ENTRY, DRAFT_PHASE)
        .add_edge(DRAFT_PHASE, COUNCIL_PHASE)
        .add_edge(COUNCIL_PHASE, CONSISTENCY_RESET)
        .add_edge(CONSISTENCY_RESET, CONSISTENCY_PHASE)
        .add_conditional_edges(CONSISTENCY_PHASE, loop_or_end, &[DRAFT_RESET, END])
        .add_edge(DRAFT_RESET, LOOP_ENTRY)
        .max_steps(pipeline_step_limit(options.loop_budget).max(options.max_steps))
        .compile()
}

/// Generates cases for requests
pub struct CaseGenerator {
    options: PipelineOptions,
    graph: Graph,
    translation: Option<TranslationPipeline>,
}

impl CaseGenerator {
    pub fn new(
        collaborators: CaseCollaborators,
        options: PipelineOptions,
    ) -> Result<Self, CasegenError> {
        options.validate()?;
        let graph = build_pipeline_graph(&collaborators, &options)?;
        Ok(Self {
            options,
            graph,
            translation: None,
        })
    }

    /// Translate results for requests that ask for another language
    pub fn with_translation(mut self, translation: TranslationPipeline) -> Self {
        self.translation = Some(translation);
        self
    }

    /// Wire model-backed collaborators from settings
    pub fn from_settings(
        settings: &Settings,
        cache: Arc<TranslationCache>,
    ) -> Result<Self, CasegenError> {
        let model = create_model(&settings.model.provider, &settings.model.name)?;
        log::info!(
            "Using {} model {}",
            model.provider(),
            settings.model.name
        );
        let collaborators = Arc::new(ModelCollaborators::with_temperatures(
            model,
            settings.model.creative_temperature,
            settings.model.deterministic_temperature,
        ));

        let options = settings.pipeline.clone();
        let translation = TranslationPipeline::new(
            collaborators.clone(),
            cache,
            options.translation.clone(),
            options.source_language.clone(),
            options.retry,
        )?;
        Ok(Self::new(CaseCollaborators::from_model(collaborators), options)?
            .with_translation(translation))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn translation(&self) -> Option<&TranslationPipeline> {
        self.translation.as_ref()
    }

    /// Run the pipeline in the source language
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Case, CasegenError> {
        request.validate()?;
        let run_id = Uuid::new_v4();
        log::info!(
            "[Pipeline {}] Generating case for '{}' ({} drafts, council of {})",
            run_id,
            request.target,
            self.options.draft_count,
            self.options.council_size
        );

        let mut input = Map::new();
        input.insert(keys::SPEC.to_string(), serde_json::to_value(request)?);
        input.insert(keys::DRAFT_COUNT.to_string(), json!(self.options.draft_count));
        input.insert(keys::COUNCIL_SIZE.to_string(), json!(self.options.council_size));
        input.insert(
            keys::REFINEMENT_REMAINING.to_string(),
            json!(self.options.refinement_budget),
        );
        input.insert(keys::LOOP_REMAINING.to_string(), json!(self.options.loop_budget));

        let state = self
            .graph
            .execute(self.graph.initial_state(input))
            .await
            .map_err(|e| {
                log::error!("[Pipeline {}] Failed: {}", run_id, e);
                e
            })?;

        let case: Option<Case> = state.get_typed(keys::CASE)?;
        match case.filter(|c| !c.as_map().is_empty()) {
            Some(case) => {
                log::info!("[Pipeline {}] Done", run_id);
                Ok(case)
            }
            None => {
                log::error!("[Pipeline {}] No case was produced", run_id);
                Err(CasegenError::GenerationFailed(format!(
                    "no case produced for '{}'",
                    request.target
                )))
            }
        }
    }

    /// Generate, then translate when the request names another language
    ///
    /// Categories given in the requested language are mapped back to the
    /// source language first.
    pub async fn run(&self, request: GenerationRequest) -> Result<Case, CasegenError> {
        let Some(language) = request.language.clone() else {
            return self.generate(&request).await;
        };
        let translation = self.translation.as_ref().ok_or_else(|| {
            CasegenError::config(format!("no translator configured for '{}'", language))
        })?;

        let mut request = request;
        request.categories = translation
            .to_source_labels(&request.categories, &language)
            .await?;
        let case = self.generate(&request).await?;
        translation.translate(case, &language).await
    }
}
