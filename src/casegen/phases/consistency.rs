// SPDX-License-Identifier: MIT

//! Consistency phase: bounded critique and per-field refinement loop
//!
//! ```text
//! START -> consistency_iteration_decrease -(no case / budget spent)-> END
//!                 ^                       -> consistency_critique -(no findings)-> END
//!                 |                                               -> refine_dispatch
//!                 +---- refine_fan_in <== field_refine x distinct finding fields
//! ```

use super::{counter, current_case, findings, keys, request};
use crate::adk::error::{CallError, CasegenError, WorkflowError};
use crate::adk::retry::{retry, RetryPolicy};
use crate::casegen::collaborators::{Critic, RefinerRegistry};
use crate::casegen::decode::{decode, FieldSchema, FindingsSchema};
use crate::casegen::types::Finding;
use crate::casegen::workflow::graph::{
    dispatcher, fn_node, noop_node, router, Branch, Graph, GraphBuilder, Node, END, START,
};
use crate::casegen::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const ITERATION_DECREASE: &str = "consistency_iteration_decrease";
pub const CRITIQUE: &str = "consistency_critique";
pub const REFINE_DISPATCH: &str = "refine_dispatch";
pub const FIELD_REFINE: &str = "field_refine";
pub const REFINE_FAN_IN: &str = "refine_fan_in";

struct CritiqueNode {
    critic: Arc<dyn Critic>,
    retry: RetryPolicy,
}

#[async_trait]
impl Node for CritiqueNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let case = current_case(state)?
            .ok_or_else(|| WorkflowError::invalid_state(keys::CASE, "no case to critique"))?;
        let request = request(state)?;

        let critic = &self.critic;
        let case = &case;
        let request = &request;
        let findings = retry(self.retry, "critique", move || async move {
            let raw = critic.critique(case, request).await?;
            Ok::<_, CallError>(decode(&raw, &FindingsSchema)?)
        })
        .await?;

        if findings.is_empty() {
            log::info!("[Consistency] No inconsistencies found");
        } else {
            for finding in &findings {
                log::info!(
                    "[Consistency] {} ({}): {}",
                    finding.field,
                    finding.severity,
                    finding.description
                );
            }
        }
        Ok(StateUpdate::new().set(keys::FINDINGS, serde_json::to_value(findings)?))
    }
}

/// Rewrites the field named in the branch payload
struct FieldRefineNode {
    refiners: RefinerRegistry,
    retry: RetryPolicy,
}

#[async_trait]
impl Node for FieldRefineNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let field: String = state.require(keys::REFINE_FIELD)?;
        let case = current_case(state)?
            .ok_or_else(|| WorkflowError::invalid_state(keys::CASE, "no case to refine"))?;
        let scoped: Vec<Finding> = findings(state)?
            .into_iter()
            .filter(|f| f.field == field)
            .collect();
        let refiner = self.refiners.get(&field).ok_or_else(|| {
            WorkflowError::invalid_state(keys::REFINE_FIELD, format!("no refiner for '{}'", field))
        })?;
        log::debug!("[Consistency] Refining '{}' ({} findings)", field, scoped.len());

        let refiner = &refiner;
        let field_ref = field.as_str();
        let case = &case;
        let scoped = scoped.as_slice();
        let schema = &FieldSchema {
            field: field.clone(),
        };
        let label = format!("refine {}", field);
        let value = retry(self.retry, &label, move || async move {
            let raw = refiner.refine(field_ref, case, scoped).await?;
            Ok::<_, CallError>(decode(&raw, schema)?)
        })
        .await?;

        let mut patch = Map::new();
        patch.insert(field, value);
        Ok(StateUpdate::new().set(keys::CASE, Value::Object(patch)))
    }
}

/// Steps a Consistency run takes at most for `budget`
///
/// Each refinement round is four steps; the final budget check adds one.
pub fn consistency_step_limit(budget: u32) -> u32 {
    budget.saturating_mul(4).saturating_add(2)
}

/// Build the Consistency phase graph
pub fn build_consistency_graph(
    critic: Arc<dyn Critic>,
    refiners: RefinerRegistry,
    retry: RetryPolicy,
    max_steps: u32,
) -> Result<Graph, WorkflowError> {
    let decrease = fn_node(|state| {
        let remaining = counter(state, keys::REFINEMENT_REMAINING) - 1;
        log::debug!("[Consistency] {} refinement rounds remaining", remaining);
        Ok(StateUpdate::new().set(keys::REFINEMENT_REMAINING, json!(remaining)))
    });

    let continue_or_stop = router(|state| {
        if current_case(state)?.is_none() {
            log::warn!("[Consistency] No case to check");
            return Ok(END.to_string());
        }
        if counter(state, keys::REFINEMENT_REMAINING) <= 0 {
            log::info!("[Consistency] Refinement budget spent");
            return Ok(END.to_string());
        }
        Ok(CRITIQUE.to_string())
    });

    let refine_or_stop = router(|state| {
        Ok(if findings(state)?.is_empty() {
            END.to_string()
        } else {
            REFINE_DISPATCH.to_string()
        })
    });

    let registry = refiners.clone();
    let spawn = dispatcher(move |state| {
        let fields: BTreeSet<String> = findings(state)?.into_iter().map(|f| f.field).collect();
        let requested = request(state)?.fields;
        let case_fields: BTreeSet<String> = current_case(state)?
            .map(|case| case.fields().cloned().collect())
            .unwrap_or_default();
        let mut branches = Vec::new();
        for field in fields {
            if !case_fields.contains(&field) && !requested.contains(&field) {
                log::warn!("[Consistency] '{}' is not a case field, skipping", field);
            } else if registry.contains(&field) {
                branches.push(Branch::new(FIELD_REFINE).with(keys::REFINE_FIELD, json!(field)));
            } else {
                log::warn!("[Consistency] No refiner registered for '{}', skipping", field);
            }
        }
        log::info!("[Consistency] Refining {} fields", branches.len());
        Ok(branches)
    });

    GraphBuilder::new("consistency", super::case_state_schema())
        .add_node(ITERATION_DECREASE, decrease)
        .add_node(CRITIQUE, Arc::new(CritiqueNode { critic, retry }))
        .add_node(REFINE_DISPATCH, noop_node())
        .add_branch_node(FIELD_REFINE, Arc::new(FieldRefineNode { refiners, retry }))
        .add_node(REFINE_FAN_IN, noop_node())
        .add_edge(START, ITERATION_DECREASE)
        .add_conditional_edges(ITERATION_DECREASE, continue_or_stop, &[CRITIQUE, END])
        .add_conditional_edges(CRITIQUE, refine_or_stop, &[REFINE_DISPATCH, END])
        .add_fan_out(REFINE_DISPATCH, spawn, REFINE_FAN_IN)
        .add_edge(REFINE_FAN_IN, ITERATION_DECREASE)
        .max_steps(max_steps)
        .compile()
}
