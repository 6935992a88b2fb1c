// SPDX-License-Identifier: MIT

//! Draft phase: `draftCount` parallel generators appending to `drafts`

use super::{counter, current_case, findings, keys, request};
use crate::adk::error::{CallError, CasegenError, WorkflowError};
use crate::adk::retry::{retry, RetryPolicy};
use crate::casegen::collaborators::Generator;
use crate::casegen::decode::{decode, CaseSchema};
use crate::casegen::types::DraftEntry;
use crate::casegen::workflow::graph::{
    dispatcher, noop_node, Branch, Graph, GraphBuilder, Node, END, START,
};
use crate::casegen::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const DRAFT_GENERATION: &str = "draft_generation";
pub const DRAFT_FAN_IN: &str = "draft_fan_in";

/// One draft branch
struct DraftGenerationNode {
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
}

#[async_trait]
impl Node for DraftGenerationNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let index: usize = state.require(keys::DRAFT_INDEX)?;
        let request = request(state)?;
        let prior_case = current_case(state)?;
        let prior_findings = findings(state)?;
        log::debug!("[Draft #{}] Generating", index);

        let generator = &self.generator;
        let request = &request;
        let prior_case = prior_case.as_ref();
        let prior_findings = prior_findings.as_slice();
        let schema = &CaseSchema::new(&request.fields);
        let label = format!("draft #{}", index);

        let case = retry(self.retry, &label, move || async move {
            let raw = generator
                .generate(request, prior_case, prior_findings)
                .await?;
            Ok::<_, CallError>(decode(&raw, schema)?)
        })
        .await?;

        log::info!("[Draft #{}] Generated case with {} fields", index, case.as_map().len());
        let entry = DraftEntry {
            draft_index: index,
            case,
        };
        Ok(StateUpdate::new().set(keys::DRAFTS, serde_json::to_value(entry)?))
    }
}

/// Build the Draft phase graph
pub fn build_draft_graph(
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
    max_steps: u32,
) -> Result<Graph, WorkflowError> {
    let spawn = dispatcher(|state| {
        let count = counter(state, keys::DRAFT_COUNT).max(0);
        log::info!("[Draft] Spawning {} parallel generators", count);
        Ok((0..count)
            .map(|index| Branch::new(DRAFT_GENERATION).with(keys::DRAFT_INDEX, json!(index)))
            .collect())
    });

    GraphBuilder::new("draft", super::case_state_schema())
        .add_branch_node(DRAFT_GENERATION, Arc::new(DraftGenerationNode { generator, retry }))
        .add_node(DRAFT_FAN_IN, noop_node())
        .add_fan_out(START, spawn, DRAFT_FAN_IN)
        .add_edge(DRAFT_FAN_IN, END)
        .max_steps(max_steps)
        .compile()
}
