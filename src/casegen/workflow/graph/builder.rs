// SPDX-License-Identifier: MIT

//! Graph builder - declares nodes and edges, validates them on compile

use crate::adk::error::WorkflowError;
use crate::casegen::workflow::state::StateSchema;
use std::collections::HashMap;
use std::sync::Arc;

use super::executor::Graph;
use super::types::{Dispatcher, Edge, Node, Router, END, START};

/// Default guard against graphs that never reach `END`
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// Builder for a [`Graph`]
pub struct GraphBuilder {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Arc<dyn Node>>,
    branch_nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    max_steps: u32,
    // Reported by compile() so declarations can stay chained
    errors: Vec<WorkflowError>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>, schema: StateSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            nodes: HashMap::new(),
            branch_nodes: HashMap::new(),
            edges: HashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
            errors: Vec::new(),
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.nodes.contains_key(name) || self.branch_nodes.contains_key(name)
    }

    fn check_name(&mut self, name: &str) -> bool {
        if name == START || name == END || self.is_declared(name) {
            self.errors
                .push(WorkflowError::DuplicateNode(name.to_string()));
            return false;
        }
        true
    }

    /// Declare a node reached through direct or conditional edges
    pub fn add_node(mut self, name: &str, node: Arc<dyn Node>) -> Self {
        if self.check_name(name) {
            self.nodes.insert(name.to_string(), node);
        }
        self
    }

    /// Declare a node only reachable as a fan-out target
    pub fn add_branch_node(mut self, name: &str, node: Arc<dyn Node>) -> Self {
        if self.check_name(name) {
            self.branch_nodes.insert(name.to_string(), node);
        }
        self
    }

    fn set_edge(mut self, from: &str, edge: Edge) -> Self {
        if self.edges.contains_key(from) {
            self.errors
                .push(WorkflowError::DuplicateEdge(from.to_string()));
        } else {
            self.edges.insert(from.to_string(), edge);
        }
        self
    }

    /// Unconditional edge
    pub fn add_edge(self, from: &str, to: &str) -> Self {
        self.set_edge(from, Edge::Direct(to.to_string()))
    }

    /// Edge whose successor is chosen by `router` among `targets`
    pub fn add_conditional_edges(self, from: &str, router: Router, targets: &[&str]) -> Self {
        let targets = targets.iter().map(|t| t.to_string()).collect();
        self.set_edge(from, Edge::Conditional { router, targets })
    }

    /// Fan-out edge; after the barrier execution continues at `join`
    pub fn add_fan_out(self, from: &str, dispatcher: Dispatcher, join: &str) -> Self {
        self.set_edge(
            from,
            Edge::FanOut {
                dispatcher,
                join: join.to_string(),
            },
        )
    }

    /// Override the step limit
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate the declaration and produce an executable graph
    pub fn compile(mut self) -> Result<Graph, WorkflowError> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        self.schema.validate()?;

        if !self.edges.contains_key(START) {
            return Err(WorkflowError::MissingStart(self.name));
        }

        for (from, edge) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(if self.branch_nodes.contains_key(from) {
                    WorkflowError::BranchNodeEdge(from.clone())
                } else {
                    WorkflowError::UnknownNode(from.clone())
                });
            }
            for to in edge.successors() {
                if to == END {
                    continue;
                }
                if self.branch_nodes.contains_key(to) {
                    return Err(WorkflowError::UndeclaredRoute {
                        from: from.clone(),
                        to: to.to_string(),
                    });
                }
                if !self.nodes.contains_key(to) {
                    return Err(WorkflowError::UnknownNode(to.to_string()));
                }
            }
        }

        if let Some(name) = self.nodes.keys().find(|n| !self.edges.contains_key(*n)) {
            return Err(WorkflowError::MissingEdge(name.clone()));
        }

        log::debug!(
            "Compiled graph '{}' with {} nodes and {} branch nodes",
            self.name,
            self.nodes.len(),
            self.branch_nodes.len()
        );

        Ok(Graph::new(
            self.name,
            self.schema,
            self.nodes,
            self.branch_nodes,
            self.edges,
            self.max_steps,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::casegen::workflow::graph::types::{dispatcher, noop_node, router};
    use crate::casegen::workflow::state::{FieldType, ReducerType};

    fn builder() -> GraphBuilder {
        GraphBuilder::new("test", StateSchema::new())
    }

    #[test]
    fn test_compile_linear_graph() {
        let graph = builder()
            .add_node("a", noop_node())
            .add_node("b", noop_node())
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .compile()
            .unwrap();
        assert_eq!(graph.name(), "test");
    }

    #[test]
    fn test_missing_start() {
        let result = builder()
            .add_node("a", noop_node())
            .add_edge("a", END)
            .compile();
        assert!(matches!(result, Err(WorkflowError::MissingStart(_))));
    }

    #[test]
    fn test_node_without_edge() {
        let result = builder()
            .add_node("a", noop_node())
            .add_node("dangling", noop_node())
            .add_edge(START, "a")
            .add_edge("a", END)
            .compile();
        assert!(matches!(result, Err(WorkflowError::MissingEdge(n)) if n == "dangling"));
    }

    #[test]
    fn test_edge_to_unknown_node() {
        let result = builder().add_edge(START, "ghost").compile();
        assert!(matches!(result, Err(WorkflowError::UnknownNode(n)) if n == "ghost"));
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let result = builder()
            .add_node("a", noop_node())
            .add_branch_node("a", noop_node())
            .add_edge(START, "a")
            .add_edge("a", END)
            .compile();
        assert!(matches!(result, Err(WorkflowError::DuplicateNode(_))));

        let result = builder().add_node(END, noop_node()).compile();
        assert!(matches!(result, Err(WorkflowError::DuplicateNode(_))));
    }

    #[test]
    fn test_second_edge_from_node_is_rejected() {
        let result = builder()
            .add_node("a", noop_node())
            .add_edge(START, "a")
            .add_edge("a", END)
            .add_edge("a", "a")
            .compile();
        assert!(matches!(result, Err(WorkflowError::DuplicateEdge(_))));
    }

    #[test]
    fn test_branch_node_cannot_be_routed_to() {
        let result = builder()
            .add_branch_node("worker", noop_node())
            .add_conditional_edges(START, router(|_| Ok(END.into())), &["worker", END])
            .compile();
        assert!(matches!(result, Err(WorkflowError::UndeclaredRoute { .. })));
    }

    #[test]
    fn test_branch_node_cannot_have_edge() {
        let result = builder()
            .add_node("join", noop_node())
            .add_branch_node("worker", noop_node())
            .add_fan_out(START, dispatcher(|_| Ok(vec![])), "join")
            .add_edge("join", END)
            .add_edge("worker", "join")
            .compile();
        assert!(matches!(result, Err(WorkflowError::BranchNodeEdge(n)) if n == "worker"));
    }

    #[test]
    fn test_schema_is_validated() {
        let schema = StateSchema::new().field("n", FieldType::Number, ReducerType::Append);
        let result = GraphBuilder::new("bad", schema)
            .add_edge(START, END)
            .compile();
        assert!(matches!(result, Err(WorkflowError::InvalidSchema(_))));
    }
}
