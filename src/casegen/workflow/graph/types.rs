// SPDX-License-Identifier: MIT

//! Graph workflow type definitions
//!
//! Nodes, edges and fan-out branches. A graph is declared with
//! [`GraphBuilder`](super::GraphBuilder) and executed by [`Graph`](super::Graph).

use crate::adk::error::CasegenError;
use crate::casegen::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Entry pseudo-node; carries the graph's first edge
pub const START: &str = "__start__";
/// Terminal pseudo-node
pub const END: &str = "__end__";

/// A named unit of work: reads state, returns a partial update
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError>;
}

/// Chooses the successor of a node from the post-merge state
pub type Router = Arc<dyn Fn(&WorkflowState) -> Result<String, CasegenError> + Send + Sync>;

/// Produces the branches of a fan-out from the current state
pub type Dispatcher =
    Arc<dyn Fn(&WorkflowState) -> Result<Vec<Branch>, CasegenError> + Send + Sync>;

/// One fan-out branch: a branch node plus the payload laid over its state view
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub target: String,
    pub payload: Map<String, Value>,
}

impl Branch {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field visible only to this branch
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    /// Unconditional successor
    Direct(String),
    /// Router picks one of the declared targets
    Conditional { router: Router, targets: Vec<String> },
    /// Run branch nodes concurrently, merge in branch order, continue at `join`
    FanOut { dispatcher: Dispatcher, join: String },
}

impl Edge {
    /// Nodes this edge may continue at
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
            Edge::FanOut { join, .. } => vec![join.as_str()],
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
            Edge::FanOut { join, .. } => f
                .debug_struct("FanOut")
                .field("join", join)
                .finish_non_exhaustive(),
        }
    }
}

/// Node backed by a synchronous closure
pub struct FnNode<F> {
    f: F,
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&WorkflowState) -> Result<StateUpdate, CasegenError> + Send + Sync,
{
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        (self.f)(state)
    }
}

/// Wrap a closure as a node
pub fn fn_node<F>(f: F) -> Arc<dyn Node>
where
    F: Fn(&WorkflowState) -> Result<StateUpdate, CasegenError> + Send + Sync + 'static,
{
    Arc::new(FnNode { f })
}

/// Node that changes nothing; marks a fan-in point
pub fn noop_node() -> Arc<dyn Node> {
    fn_node(|_| Ok(StateUpdate::new()))
}

/// Wrap a closure as a router
pub fn router<F>(f: F) -> Router
where
    F: Fn(&WorkflowState) -> Result<String, CasegenError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a fan-out dispatcher
pub fn dispatcher<F>(f: F) -> Dispatcher
where
    F: Fn(&WorkflowState) -> Result<Vec<Branch>, CasegenError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_branch_payload() {
        let branch = Branch::new("draft_generation").with("draftIndex", json!(2));
        assert_eq!(branch.target, "draft_generation");
        assert_eq!(branch.payload["draftIndex"], 2);
    }

    #[test]
    fn test_edge_successors() {
        let direct = Edge::Direct("b".to_string());
        assert_eq!(direct.successors(), vec!["b"]);

        let conditional = Edge::Conditional {
            router: router(|_| Ok(END.to_string())),
            targets: vec!["b".to_string(), END.to_string()],
        };
        assert_eq!(conditional.successors(), vec!["b", END]);

        let fan_out = Edge::FanOut {
            dispatcher: dispatcher(|_| Ok(vec![])),
            join: "fan_in".to_string(),
        };
        assert_eq!(fan_out.successors(), vec!["fan_in"]);
        assert!(format!("{:?}", fan_out).contains("fan_in"));
    }

    #[tokio::test]
    async fn test_fn_node_runs_closure() {
        let node = fn_node(|state| {
            let n = state.get_i64("n").unwrap_or(0);
            Ok(StateUpdate::new().set("n", json!(n + 1)))
        });

        let mut state = WorkflowState::empty();
        state.replace("n", json!(41));
        let update = node.run(&state).await.unwrap();
        state.apply(update).unwrap();
        assert_eq!(state.get_i64("n"), Some(42));
    }

    #[tokio::test]
    async fn test_noop_node_returns_empty_update() {
        let update = noop_node().run(&WorkflowState::empty()).await.unwrap();
        assert!(update.is_empty());
    }
}
