// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! Nodes connected by direct, conditional and fan-out edges, executed over a
//! shared [`WorkflowState`](crate::casegen::workflow::state::WorkflowState).

mod builder;
mod executor;
mod types;

pub use builder::{GraphBuilder, DEFAULT_MAX_STEPS};
pub use executor::Graph;
pub use types::{
    dispatcher, fn_node, noop_node, router, Branch, Dispatcher, Edge, FnNode, Node, Router, END,
    START,
};
