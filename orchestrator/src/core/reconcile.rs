//! Merge of the planner's next state with what agents wrote to disk meanwhile.
//!
//! Agents record review feedback straight into the persisted state file while
//! a cycle is running. Feedback is only carried over when both sides describe
//! the same status epoch; anything from an older epoch is stale.

use chrono::{DateTime, Utc};

use crate::core::policy::STATUS_IN_REVIEW;
use crate::core::types::{ItemState, OrchestratorState};

/// Merge runner-managed feedback fields from `disk` into `next`.
pub fn merge_runner_managed_state_fields(
    next: OrchestratorState,
    disk: &OrchestratorState,
) -> OrchestratorState {
    let mut merged = next;

    for (item_id, state) in &mut merged.items {
        if let Some(on_disk) = disk.items.get(item_id) {
            if state.same_epoch(on_disk) {
                merge_item(state, on_disk);
            }
        }
        if state.last_seen_status.as_deref() != Some(STATUS_IN_REVIEW) {
            state.in_review_origin = None;
        }
    }
    for (item_id, on_disk) in &disk.items {
        if !merged.items.contains_key(item_id) {
            merged.items.insert(item_id.clone(), on_disk.clone());
        }
    }

    if merged.sprint_plan.is_none() {
        merged.sprint_plan.clone_from(&disk.sprint_plan);
    }
    if merged.ownership_index.is_none() {
        merged.ownership_index.clone_from(&disk.ownership_index);
    }
    if merged.end_of_sprint_reported.is_none() {
        merged
            .end_of_sprint_reported
            .clone_from(&disk.end_of_sprint_reported);
    }
    merged
}

fn merge_item(state: &mut ItemState, on_disk: &ItemState) {
    state.review_cycle_count = state.review_cycle_count.max(on_disk.review_cycle_count);

    let disk_feedback_newer = match (state.last_reviewer_feedback_at, on_disk.last_reviewer_feedback_at) {
        (Some(ours), Some(theirs)) => theirs > ours,
        (None, Some(_)) => true,
        (_, None) => {
            state.last_reviewer_feedback_at.is_none() && state.last_reviewer_outcome.is_none()
        }
    };
    if disk_feedback_newer && on_disk.last_reviewer_outcome.is_some() {
        state.last_reviewer_feedback_at = on_disk.last_reviewer_feedback_at;
        state.last_reviewer_outcome = on_disk.last_reviewer_outcome;
    }

    state.last_executor_response_at =
        later(state.last_executor_response_at, on_disk.last_executor_response_at);
}

fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
