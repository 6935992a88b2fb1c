// SPDX-License-Identifier: MIT

//! Council phase: vote among the drafts and select the winner as `case`

use super::{counter, keys, request};
use crate::adk::error::{CallError, CasegenError, WorkflowError};
use crate::adk::retry::{retry, RetryPolicy};
use crate::casegen::collaborators::Voter;
use crate::casegen::decode::{decode, typed};
use crate::casegen::types::{DraftEntry, Vote};
use crate::casegen::workflow::graph::{
    dispatcher, noop_node, router, Branch, Graph, GraphBuilder, Node, END, START,
};
use crate::casegen::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const VOTE_DISPATCH: &str = "vote_dispatch";
pub const GENERATE_VOTE: &str = "generate_vote";
pub const COUNCIL_FAN_IN: &str = "council_fan_in";
pub const DRAFT_SELECTION: &str = "draft_selection";

fn drafts(state: &WorkflowState) -> Result<Vec<DraftEntry>, CasegenError> {
    Ok(state.get_typed(keys::DRAFTS)?.unwrap_or_default())
}

/// Voting a single option, or with a single voter, is skipped
fn skip_voting(state: &WorkflowState) -> Result<bool, CasegenError> {
    Ok(counter(state, keys::COUNCIL_SIZE) <= 1 || drafts(state)?.len() <= 1)
}

/// Highest tally wins; ties go to the lowest index
pub fn select_winner(tally: &HashMap<usize, i64>) -> Option<usize> {
    tally
        .iter()
        .max_by(|(a_index, a_count), (b_index, b_count)| {
            a_count.cmp(b_count).then(b_index.cmp(a_index))
        })
        .map(|(index, _)| *index)
}

/// One council member's ballot
struct VoteNode {
    voter: Arc<dyn Voter>,
    retry: RetryPolicy,
}

#[async_trait]
impl Node for VoteNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let drafts = drafts(state)?;
        let request = request(state)?;

        let voter = &self.voter;
        let drafts = drafts.as_slice();
        let request = &request;
        let vote = retry(self.retry, "council vote", move || async move {
            let raw = voter.vote(drafts, request).await?;
            Ok::<_, CallError>(decode(&raw, &typed::<Vote>())?)
        })
        .await?;

        log::debug!("[Council] Ballot for draft #{}", vote.draft_index);
        let mut ballot = Map::new();
        ballot.insert(vote.draft_index.to_string(), json!(1));
        Ok(StateUpdate::new().set(keys::VOTES, Value::Object(ballot)))
    }
}

/// Copy the chosen draft into `case`
struct SelectionNode;

#[async_trait]
impl Node for SelectionNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let drafts = drafts(state)?;
        let Some(first) = drafts.first() else {
            log::warn!("[Council] No drafts to select from");
            return Ok(StateUpdate::new());
        };

        let chosen = if skip_voting(state)? {
            log::info!("[Council] Voting skipped, selecting draft #{}", first.draft_index);
            first
        } else {
            let votes: HashMap<String, i64> = state.get_typed(keys::VOTES)?.unwrap_or_default();
            let mut tally = HashMap::new();
            for (index, count) in votes {
                match index.parse::<usize>() {
                    Ok(index) => {
                        tally.insert(index, count);
                    }
                    Err(_) => log::warn!("[Council] Ignoring ballot for '{}'", index),
                }
            }
            log::info!("[Council] Tally: {:?}", tally);

            match select_winner(&tally) {
                Some(winner) => match drafts.iter().find(|d| d.draft_index == winner) {
                    Some(draft) => {
                        log::info!("[Council] Selected draft #{}", winner);
                        draft
                    }
                    None => {
                        log::warn!(
                            "[Council] Winner #{} is not among the drafts, falling back to draft #{}",
                            winner,
                            first.draft_index
                        );
                        first
                    }
                },
                None => {
                    log::warn!(
                        "[Council] No ballots counted, falling back to draft #{}",
                        first.draft_index
                    );
                    first
                }
            }
        };

        Ok(StateUpdate::new().replace(keys::CASE, chosen.case.to_value()))
    }
}

/// Build the Council phase graph
pub fn build_council_graph(
    voter: Arc<dyn Voter>,
    retry: RetryPolicy,
    max_steps: u32,
) -> Result<Graph, WorkflowError> {
    let entry = router(|state| {
        Ok(if skip_voting(state)? {
            DRAFT_SELECTION.to_string()
        } else {
            VOTE_DISPATCH.to_string()
        })
    });

    let ballots = dispatcher(|state| {
        let size = counter(state, keys::COUNCIL_SIZE).max(0);
        log::info!("[Council] Collecting {} votes", size);
        Ok((0..size).map(|_| Branch::new(GENERATE_VOTE)).collect())
    });

    GraphBuilder::new("council", super::case_state_schema())
        .add_node(VOTE_DISPATCH, noop_node())
        .add_branch_node(GENERATE_VOTE, Arc::new(VoteNode { voter, retry }))
        .add_node(COUNCIL_FAN_IN, noop_node())
        .add_node(DRAFT_SELECTION, Arc::new(SelectionNode))
        .add_conditional_edges(START, entry, &[VOTE_DISPATCH, DRAFT_SELECTION])
        .add_fan_out(VOTE_DISPATCH, ballots, COUNCIL_FAN_IN)
        .add_edge(COUNCIL_FAN_IN, DRAFT_SELECTION)
        .add_edge(DRAFT_SELECTION, END)
        .max_steps(max_steps)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::casegen::phases::testing::ScriptedVoter;
    use crate::casegen::types::{Case, GenerationRequest};
    use std::sync::atomic::Ordering;

    fn draft(index: usize) -> DraftEntry {
        DraftEntry {
            draft_index: index,
            case: Case::new().with("chiefComplaint", json!(format!("draft {}", index))),
        }
    }

    fn input(council_size: i64, drafts: &[DraftEntry]) -> Map<String, Value> {
        let mut input = Map::new();
        input.insert(
            keys::SPEC.to_string(),
            serde_json::to_value(GenerationRequest::new("Appendicitis")).unwrap(),
        );
        input.insert(keys::COUNCIL_SIZE.to_string(), json!(council_size));
        input.insert(keys::DRAFTS.to_string(), serde_json::to_value(drafts).unwrap());
        input
    }

    async fn run(voter: Arc<ScriptedVoter>, input: Map<String, Value>) -> WorkflowState {
        let graph = build_council_graph(voter, RetryPolicy::none(), 100).unwrap();
        graph.execute(graph.initial_state(input)).await.unwrap()
    }

    #[test]
    fn test_select_winner() {
        let tally: HashMap<usize, i64> = [(0, 1), (2, 2)].into_iter().collect();
        assert_eq!(select_winner(&tally), Some(2));

        let tied: HashMap<usize, i64> = [(3, 1), (1, 1), (2, 1)].into_iter().collect();
        assert_eq!(select_winner(&tied), Some(1));

        assert_eq!(select_winner(&HashMap::new()), None);
    }

    #[tokio::test]
    async fn test_majority_draft_is_selected() {
        let voter = Arc::new(ScriptedVoter::new(&[2, 1, 2]));
        let drafts = [draft(0), draft(1), draft(2)];

        let state = run(voter.clone(), input(3, &drafts)).await;

        assert_eq!(voter.calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.get(keys::VOTES), Some(&json!({"1": 1, "2": 2})));
        assert_eq!(state.get(keys::CASE), Some(&drafts[2].case.to_value()));
    }

    #[tokio::test]
    async fn test_tie_goes_to_lowest_index() {
        let voter = Arc::new(ScriptedVoter::new(&[2, 1]));
        let drafts = [draft(0), draft(1), draft(2)];

        let state = run(voter, input(2, &drafts)).await;
        assert_eq!(state.get(keys::CASE), Some(&drafts[1].case.to_value()));
    }

    #[tokio::test]
    async fn test_single_voter_skips_voting() {
        let voter = Arc::new(ScriptedVoter::new(&[1]));
        let drafts = [draft(0), draft(1)];

        let state = run(voter.clone(), input(1, &drafts)).await;

        assert_eq!(voter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.get(keys::CASE), Some(&drafts[0].case.to_value()));
    }

    #[tokio::test]
    async fn test_single_draft_skips_voting() {
        let voter = Arc::new(ScriptedVoter::new(&[0, 0, 0]));
        let drafts = [draft(0)];

        let state = run(voter.clone(), input(3, &drafts)).await;

        assert_eq!(voter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.get(keys::CASE), Some(&drafts[0].case.to_value()));
    }

    #[tokio::test]
    async fn test_unknown_winner_falls_back_to_first_draft() {
        let voter = Arc::new(ScriptedVoter::new(&[7, 7]));
        let drafts = [draft(0), draft(1)];

        let state = run(voter, input(2, &drafts)).await;
        assert_eq!(state.get(keys::CASE), Some(&drafts[0].case.to_value()));
    }

    #[tokio::test]
    async fn test_selection_replaces_previous_case() {
        let voter = Arc::new(ScriptedVoter::new(&[]));
        let mut input = input(1, &[draft(0)]);
        input.insert(
            keys::CASE.to_string(),
            json!({"chiefComplaint": "old", "symptoms": ["stale"]}),
        );

        let state = run(voter, input).await;
        assert_eq!(state.get(keys::CASE), Some(&json!({"chiefComplaint": "draft 0"})));
    }

    #[tokio::test]
    async fn test_no_drafts_leaves_case_unset() {
        let voter = Arc::new(ScriptedVoter::new(&[]));
        let state = run(voter, input(3, &[])).await;
        assert!(state.get(keys::CASE).is_none());
    }
}
