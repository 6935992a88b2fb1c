// SPDX-License-Identifier: MIT

//! Draft, Council and Consistency phase graphs
//!
//! All three share one state schema so they compose as subgraphs of the
//! pipeline graph.

pub mod consistency;
pub mod council;
pub mod draft;

pub use consistency::{build_consistency_graph, consistency_step_limit};
pub use council::{build_council_graph, select_winner};
pub use draft::build_draft_graph;

use crate::adk::error::CasegenError;
use crate::casegen::types::{Case, Finding, GenerationRequest};
use crate::casegen::workflow::state::{FieldType, ReducerType, StateSchema, WorkflowState};
use serde_json::json;

/// State keys shared by the phase graphs
pub mod keys {
    pub const SPEC: &str = "spec";
    pub const DRAFT_COUNT: &str = "draftCount";
    pub const COUNCIL_SIZE: &str = "councilSize";
    pub const DRAFTS: &str = "drafts";
    pub const VOTES: &str = "votes";
    pub const CASE: &str = "case";
    pub const FINDINGS: &str = "findings";
    pub const REFINEMENT_REMAINING: &str = "refinementRemaining";
    pub const LOOP_REMAINING: &str = "loopIterationsRemaining";

    /// Fan-out payload: index of a draft branch
    pub const DRAFT_INDEX: &str = "draftIndex";
    /// Fan-out payload: field a refine branch owns
    pub const REFINE_FIELD: &str = "refineField";
}

/// Schema of the case generation state
pub fn case_state_schema() -> StateSchema {
    StateSchema::new()
        .field(keys::SPEC, FieldType::Object, ReducerType::Overwrite)
        .field_with_default(keys::DRAFT_COUNT, FieldType::Number, ReducerType::Overwrite, json!(0))
        .field_with_default(keys::COUNCIL_SIZE, FieldType::Number, ReducerType::Overwrite, json!(0))
        .field_with_default(keys::DRAFTS, FieldType::Array, ReducerType::Append, json!([]))
        .field_with_default(keys::VOTES, FieldType::Object, ReducerType::SumByKey, json!({}))
        .field(keys::CASE, FieldType::Object, ReducerType::Merge)
        .field_with_default(keys::FINDINGS, FieldType::Array, ReducerType::Overwrite, json!([]))
        .field_with_default(
            keys::REFINEMENT_REMAINING,
            FieldType::Number,
            ReducerType::Overwrite,
            json!(0),
        )
        .field_with_default(
            keys::LOOP_REMAINING,
            FieldType::Number,
            ReducerType::Overwrite,
            json!(0),
        )
}

fn request(state: &WorkflowState) -> Result<GenerationRequest, CasegenError> {
    Ok(state.require(keys::SPEC)?)
}

fn current_case(state: &WorkflowState) -> Result<Option<Case>, CasegenError> {
    let case: Option<Case> = state.get_typed(keys::CASE)?;
    Ok(case.filter(|c| !c.as_map().is_empty()))
}

fn findings(state: &WorkflowState) -> Result<Vec<Finding>, CasegenError> {
    Ok(state.get_typed(keys::FINDINGS)?.unwrap_or_default())
}

fn counter(state: &WorkflowState, key: &str) -> i64 {
    state.get_i64(key).unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the phase tests

    use crate::adk::error::CallError;
    use crate::casegen::collaborators::{Critic, FieldRefiner, Generator, Voter};
    use crate::casegen::types::{Case, DraftEntry, Finding, GenerationRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Generator numbering its drafts by call order
    #[derive(Default)]
    pub struct CountingGenerator {
        pub calls: AtomicUsize,
        pub saw_prior: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
            prior_case: Option<&Case>,
            _prior_findings: &[Finding],
        ) -> Result<String, CallError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if prior_case.is_some() {
                self.saw_prior.fetch_add(1, Ordering::SeqCst);
            }
            let mut case = serde_json::Map::new();
            for field in &request.fields {
                case.insert(field.clone(), json!(format!("{} v{}", field, n)));
            }
            Ok(serde_json::Value::Object(case).to_string())
        }
    }

    /// Voter replaying a fixed list of ballots
    pub struct ScriptedVoter {
        ballots: Mutex<VecDeque<usize>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedVoter {
        pub fn new(ballots: &[usize]) -> Self {
            Self {
                ballots: Mutex::new(ballots.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Voter for ScriptedVoter {
        async fn vote(
            &self,
            _drafts: &[DraftEntry],
            _request: &GenerationRequest,
        ) -> Result<String, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ballot = self.ballots.lock().unwrap().pop_front().unwrap_or(0);
            Ok(json!({ "draftIndex": ballot }).to_string())
        }
    }

    /// Critic replaying one findings list per call, then reporting nothing
    pub struct ScriptedCritic {
        rounds: Mutex<VecDeque<Vec<Finding>>>,
        pub calls: AtomicUsize,
        always: Option<Vec<Finding>>,
    }

    impl ScriptedCritic {
        pub fn new(rounds: Vec<Vec<Finding>>) -> Self {
            Self {
                rounds: Mutex::new(rounds.into()),
                calls: AtomicUsize::new(0),
                always: None,
            }
        }

        /// Critic that reports the same findings every time
        pub fn always(findings: Vec<Finding>) -> Self {
            Self {
                rounds: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                always: Some(findings),
            }
        }
    }

    #[async_trait]
    impl Critic for ScriptedCritic {
        async fn critique(
            &self,
            _case: &Case,
            _request: &GenerationRequest,
        ) -> Result<String, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let findings = match &self.always {
                Some(findings) => findings.clone(),
                None => self.rounds.lock().unwrap().pop_front().unwrap_or_default(),
            };
            Ok(json!({ "inconsistencies": findings }).to_string())
        }
    }

    /// Refiner writing `<field> refined` as the new value
    #[derive(Default)]
    pub struct TaggingRefiner {
        pub calls: AtomicUsize,
        pub fields: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FieldRefiner for TaggingRefiner {
        async fn refine(
            &self,
            field: &str,
            _case: &Case,
            findings: &[Finding],
        ) -> Result<String, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fields.lock().unwrap().push(field.to_string());
            assert!(findings.iter().all(|f| f.field == field));
            Ok(json!({ field: format!("{} refined", field) }).to_string())
        }
    }

    pub fn finding(field: &str) -> Finding {
        serde_json::from_value(json!({
            "field": field,
            "description": format!("{} contradicts the history", field),
            "suggestion": "align it",
            "severity": "medium"
        }))
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_state_schema_is_valid() {
        let schema = case_state_schema();
        assert!(schema.validate().is_ok());

        let state = WorkflowState::new(&schema);
        assert_eq!(state.reducer(keys::DRAFTS), ReducerType::Append);
        assert_eq!(state.reducer(keys::VOTES), ReducerType::SumByKey);
        assert_eq!(state.reducer(keys::CASE), ReducerType::Merge);
        assert_eq!(state.get(keys::DRAFTS), Some(&json!([])));
    }

    #[test]
    fn test_empty_case_reads_as_none() {
        let mut state = WorkflowState::new(&case_state_schema());
        state.replace(keys::CASE, json!({}));
        assert!(current_case(&state).unwrap().is_none());

        state.replace(keys::CASE, json!({"chiefComplaint": "pain"}));
        assert!(current_case(&state).unwrap().is_some());
    }
}
