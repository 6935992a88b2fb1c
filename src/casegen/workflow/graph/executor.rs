// SPDX-License-Identifier: MIT

//! Graph workflow executor

use crate::adk::error::{CasegenError, WorkflowError};
use crate::casegen::workflow::state::{StateSchema, StateUpdate, WorkflowState};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Branch, Edge, Node, END, START};

/// Compiled graph ready for execution
pub struct Graph {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Arc<dyn Node>>,
    branch_nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    max_steps: u32,
}

impl Graph {
    pub(super) fn new(
        name: String,
        schema: StateSchema,
        nodes: HashMap<String, Arc<dyn Node>>,
        branch_nodes: HashMap<String, Arc<dyn Node>>,
        edges: HashMap<String, Edge>,
        max_steps: u32,
    ) -> Self {
        Self {
            name,
            schema,
            nodes,
            branch_nodes,
            edges,
            max_steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Initial state for this graph from an input projection
    pub fn initial_state(&self, input: Map<String, Value>) -> WorkflowState {
        WorkflowState::from_input(&self.schema, input)
    }

    /// Run from `START` until `END` is reached
    pub async fn execute(&self, initial: WorkflowState) -> Result<WorkflowState, CasegenError> {
        let mut state = initial;
        let mut current = START.to_string();
        let mut steps = 0u32;

        loop {
            if current == END {
                log::debug!("[Graph:{}] reached end after {} steps", self.name, steps);
                return Ok(state);
            }

            if current != START {
                steps += 1;
                if steps > self.max_steps {
                    log::error!("[Graph:{}] exceeded {} steps", self.name, self.max_steps);
                    return Err(WorkflowError::StepLimitExceeded {
                        graph: self.name.clone(),
                        limit: self.max_steps,
                    }
                    .into());
                }

                let node = self
                    .nodes
                    .get(&current)
                    .ok_or_else(|| WorkflowError::UnknownNode(current.clone()))?;

                log::debug!("[Graph:{}] executing node: {}", self.name, current);
                let update = node.run(&state).await.map_err(|e| {
                    log::error!("[Graph:{}] node {} failed: {}", self.name, current, e);
                    WorkflowError::node(&current, e)
                })?;
                state
                    .apply(update)
                    .map_err(|e| WorkflowError::node(&current, e.into()))?;
            }

            current = self.follow(&current, &mut state).await?;
        }
    }

    /// Evaluate the outgoing edge of `from`, running a fan-out if it is one
    async fn follow(&self, from: &str, state: &mut WorkflowState) -> Result<String, CasegenError> {
        let edge = self
            .edges
            .get(from)
            .ok_or_else(|| WorkflowError::MissingEdge(from.to_string()))?;

        match edge {
            Edge::Direct(to) => Ok(to.clone()),
            Edge::Conditional { router, targets } => {
                let to = router(state).map_err(|e| WorkflowError::node(from, e))?;
                if !targets.contains(&to) {
                    return Err(WorkflowError::UndeclaredRoute {
                        from: from.to_string(),
                        to,
                    }
                    .into());
                }
                log::debug!("[Graph:{}] {} -> {}", self.name, from, to);
                Ok(to)
            }
            Edge::FanOut { dispatcher, join } => {
                let branches = dispatcher(state).map_err(|e| WorkflowError::node(from, e))?;
                self.run_fan_out(branches, state).await?;
                Ok(join.clone())
            }
        }
    }

    /// Run all branches concurrently and merge their updates in branch order
    ///
    /// The first failing branch aborts the barrier; nothing is merged then.
    async fn run_fan_out(
        &self,
        branches: Vec<Branch>,
        state: &mut WorkflowState,
    ) -> Result<(), CasegenError> {
        if branches.is_empty() {
            log::debug!("[Graph:{}] fan-out produced no branches", self.name);
            return Ok(());
        }

        let mut runs = Vec::with_capacity(branches.len());
        for branch in &branches {
            let node = self.branch_nodes.get(&branch.target).ok_or_else(|| {
                if self.nodes.contains_key(&branch.target) {
                    WorkflowError::NotABranchNode(branch.target.clone())
                } else {
                    WorkflowError::UnknownNode(branch.target.clone())
                }
            })?;
            runs.push((
                branch.target.as_str(),
                node.clone(),
                state.with_overlay(&branch.payload),
            ));
        }

        log::debug!(
            "[Graph:{}] fanning out {} branches",
            self.name,
            runs.len()
        );

        let updates = try_join_all(runs.iter().map(|(target, node, branch_state)| async move {
            node.run(branch_state)
                .await
                .map_err(|e| CasegenError::from(WorkflowError::node(*target, e)))
        }))
        .await?;

        for (update, (target, _, _)) in updates.into_iter().zip(runs.iter()) {
            state
                .apply(update)
                .map_err(|e| WorkflowError::node(*target, e.into()))?;
        }
        Ok(())
    }
}

/// A graph runs as a single node of an enclosing graph
///
/// The subgraph sees the parent's values under its own reducers and writes
/// every field it changed back with replace-writes.
#[async_trait]
impl Node for Graph {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let input = match state.to_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let final_state = self.execute(self.initial_state(input)).await?;

        let mut update = StateUpdate::new();
        for key in final_state.keys() {
            let value = final_state.get(key).cloned().unwrap_or(Value::Null);
            if state.get(key) != Some(&value) {
                update = update.replace(key.clone(), value);
            }
        }
        Ok(update)
    }
}
