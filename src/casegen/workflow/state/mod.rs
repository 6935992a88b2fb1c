// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares each field's type and reducer
//! - `WorkflowState` - runtime state storage with reducer support
//! - `StateUpdate` - the partial update a node returns

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{StateUpdate, StateWrite, WorkflowState};
