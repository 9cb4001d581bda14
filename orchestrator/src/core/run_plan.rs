//! Run plan builder: board snapshot + previous state → intents + next state.
//!
//! One call is one poll. The builder validates everything up front and fails
//! closed, so a rejected call leaves no trace in the returned state. Dispatch
//! order is fixed by `(issue_number, item_id)` and every `(role, status)` pair
//! is dispatched at most once per status epoch, except for scheduled reviewer
//! retries.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::PlanError;
use crate::core::policy::{STATUS_IN_PROGRESS, STATUS_IN_REVIEW, StatusPolicy, dispatch_role, is_active};
use crate::core::run_ids::RunIdGenerator;
use crate::core::types::{
    EXECUTOR_ENDPOINT, IntentBody, ItemState, OrchestratorState, REVIEWER_ENDPOINT,
    ReviewerOutcome, Role, RunIntent, WorkItem,
};

/// Capacity and timing knobs for one planning call. All values must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub max_executors: u32,
    pub max_reviewers: u32,
    pub stall_minutes: u32,
    pub review_churn_polls: u32,
    pub reviewer_retry_polls: u32,
    pub max_reviewer_dispatches_per_status: u32,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_executors: 2,
            max_reviewers: 2,
            stall_minutes: 120,
            review_churn_polls: 6,
            reviewer_retry_polls: 3,
            max_reviewer_dispatches_per_status: 3,
        }
    }
}

impl PlanLimits {
    pub fn validate(&self) -> Result<(), PlanError> {
        let fields = [
            ("max_executors", self.max_executors),
            ("max_reviewers", self.max_reviewers),
            ("stall_minutes", self.stall_minutes),
            ("review_churn_polls", self.review_churn_polls),
            ("reviewer_retry_polls", self.reviewer_retry_polls),
            (
                "max_reviewer_dispatches_per_status",
                self.max_reviewer_dispatches_per_status,
            ),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(PlanError::Validation(format!(
                    "{name} must be a positive integer"
                )));
            }
        }
        Ok(())
    }

    fn cap_for(&self, role: Role) -> u32 {
        match role {
            Role::Executor => self.max_executors,
            Role::Reviewer => self.max_reviewers,
        }
    }
}

/// Inputs of one planning call.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub items: &'a [WorkItem],
    pub policy: &'a StatusPolicy,
    pub sprint: &'a str,
    pub limits: PlanLimits,
    pub now: DateTime<Utc>,
}

/// Parse an RFC 3339 timestamp supplied by a caller.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PlanError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| PlanError::Validation(format!("invalid timestamp '{raw}': {err}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotInScope,
    NotDispatchable,
    AlreadyDispatched,
    ConcurrencyLimit,
}

impl SkipReason {
    pub const ALL: [SkipReason; 4] = [
        SkipReason::NotInScope,
        SkipReason::NotDispatchable,
        SkipReason::AlreadyDispatched,
        SkipReason::ConcurrencyLimit,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub executor: u32,
    pub reviewer: u32,
}

impl RoleCounts {
    pub fn get(&self, role: Role) -> u32 {
        match role {
            Role::Executor => self.executor,
            Role::Reviewer => self.reviewer,
        }
    }

    fn bump(&mut self, role: Role) {
        match role {
            Role::Executor => self.executor += 1,
            Role::Reviewer => self.reviewer += 1,
        }
    }
}

/// Item left undispatched because its role hit the per-cycle cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CappedItem {
    pub issue_number: u64,
    pub item_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledItem {
    pub issue_number: u64,
    pub item_id: String,
    pub minutes_in_status: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurningItem {
    pub issue_number: u64,
    pub item_id: String,
    pub polls_since_review: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedsAttention {
    pub stalled: Vec<StalledItem>,
    pub review_churn: Vec<ChurningItem>,
}

impl NeedsAttention {
    pub fn is_empty(&self) -> bool {
        self.stalled.is_empty() && self.review_churn.is_empty()
    }
}

/// Per-cycle report, emitted as `DISPATCH_SUMMARY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub sprint: String,
    pub poll_count: u64,
    pub in_scope: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub intents: RoleCounts,
    pub capped: Vec<CappedItem>,
    pub needs_attention: NeedsAttention,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub intents: Vec<RunIntent>,
    pub next_state: OrchestratorState,
    pub summary: DispatchSummary,
    pub completed: bool,
}

/// Check every item against the board item contract.
///
/// Items of other sprints only need a well-formed identity; items of the
/// target sprint must also carry an allowed status.
pub fn validate_items(
    items: &[WorkItem],
    policy: &StatusPolicy,
    sprint: &str,
) -> Result<(), PlanError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (index, item) in items.iter().enumerate() {
        if item.issue_number == 0 {
            return Err(PlanError::MalformedItem(format!(
                "item {index}: issue_number must be positive"
            )));
        }
        let item_id = item.item_id.trim();
        if item_id.is_empty() {
            return Err(PlanError::MalformedItem(format!(
                "issue #{}: item_id must be non-empty",
                item.issue_number
            )));
        }
        if item.sprint.trim().is_empty() {
            return Err(PlanError::MalformedItem(format!(
                "issue #{}: sprint must be non-empty",
                item.issue_number
            )));
        }
        if item.sprint.trim() == sprint && !policy.allows(&item.status) {
            return Err(PlanError::MalformedItem(format!(
                "issue #{}: status '{}' is not an allowed status",
                item.issue_number, item.status
            )));
        }
        if !seen.insert(item_id) {
            return Err(PlanError::MalformedItem(format!(
                "duplicate item_id '{item_id}'"
            )));
        }
    }
    Ok(())
}

/// Compute one poll's dispatch intents and the next orchestrator state.
pub fn build_run_plan<G: RunIdGenerator + ?Sized>(
    request: &PlanRequest<'_>,
    previous: &OrchestratorState,
    ids: &mut G,
) -> Result<RunPlan, PlanError> {
    let sprint = request.sprint.trim();
    if sprint.is_empty() {
        return Err(PlanError::Validation("sprint must be non-empty".to_string()));
    }
    request.limits.validate()?;
    validate_items(request.items, request.policy, sprint)?;

    let now = request.now;
    let limits = request.limits;
    let mut next = previous.clone();
    next.poll_count += 1;
    let poll = next.poll_count;

    let mut skipped: BTreeMap<SkipReason, usize> =
        SkipReason::ALL.into_iter().map(|reason| (reason, 0)).collect();
    let mut in_scope: Vec<&WorkItem> = Vec::new();
    for item in request.items {
        if item.sprint.trim() == sprint {
            in_scope.push(item);
        } else {
            *skipped.entry(SkipReason::NotInScope).or_default() += 1;
        }
    }
    in_scope.sort_by(|a, b| {
        a.issue_number
            .cmp(&b.issue_number)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    let mut status_counts: BTreeMap<String, usize> = BTreeMap::new();
    for item in &in_scope {
        *status_counts.entry(item.status.clone()).or_default() += 1;
        let observed = observe_item(next.items.get(item.item_id.trim()), item, poll, now);
        next.items.insert(item.item_id.trim().to_string(), observed);
    }

    let mut intents = Vec::new();
    let mut dispatched = RoleCounts::default();
    let mut capped = Vec::new();
    for item in &in_scope {
        let key = item.item_id.trim();
        let Some(state) = next.items.get_mut(key) else {
            continue;
        };
        let Some(role) = effective_role(state, &item.status) else {
            *skipped.entry(SkipReason::NotDispatchable).or_default() += 1;
            continue;
        };
        if state.dispatched_in_epoch(role, &item.status)
            && !reviewer_retry_due(state, role, poll, &limits)
        {
            *skipped.entry(SkipReason::AlreadyDispatched).or_default() += 1;
            continue;
        }
        if dispatched.get(role) >= limits.cap_for(role) {
            *skipped.entry(SkipReason::ConcurrencyLimit).or_default() += 1;
            capped.push(CappedItem {
                issue_number: item.issue_number,
                item_id: key.to_string(),
                role,
            });
            continue;
        }

        let run_id = ids.next_run_id();
        intents.push(build_intent(role, &run_id, item, sprint));
        dispatched.bump(role);
        state.last_dispatched_role = Some(role);
        state.last_dispatched_status = Some(item.status.clone());
        state.last_dispatched_at = Some(now);
        state.last_dispatched_poll = Some(poll);
        state.last_run_id = Some(run_id);
        if role == Role::Reviewer {
            state.reviewer_dispatches_for_current_status += 1;
        }
    }

    let mut needs_attention = NeedsAttention::default();
    for item in &in_scope {
        let Some(state) = next.items.get(item.item_id.trim()) else {
            continue;
        };
        if item.status == STATUS_IN_PROGRESS {
            if let Some(since) = state.status_since_at {
                let elapsed = now.signed_duration_since(since);
                if elapsed >= Duration::minutes(i64::from(limits.stall_minutes)) {
                    needs_attention.stalled.push(StalledItem {
                        issue_number: item.issue_number,
                        item_id: item.item_id.trim().to_string(),
                        minutes_in_status: elapsed.num_minutes(),
                    });
                }
            }
        }
        if item.status == STATUS_IN_REVIEW
            && state.dispatched_in_epoch(Role::Reviewer, STATUS_IN_REVIEW)
        {
            let since_review = state
                .last_dispatched_poll
                .map_or(0, |last| poll.saturating_sub(last));
            if since_review >= u64::from(limits.review_churn_polls) {
                needs_attention.review_churn.push(ChurningItem {
                    issue_number: item.issue_number,
                    item_id: item.item_id.trim().to_string(),
                    polls_since_review: since_review,
                });
            }
        }
    }

    let completed = !in_scope.iter().any(|item| is_active(&item.status));
    let summary = DispatchSummary {
        sprint: sprint.to_string(),
        poll_count: poll,
        in_scope: in_scope.len(),
        status_counts,
        skipped,
        intents: dispatched,
        capped,
        needs_attention,
        completed,
    };

    Ok(RunPlan {
        intents,
        next_state: next,
        summary,
        completed,
    })
}

/// Fold this poll's observation of an item into its persisted state.
fn observe_item(
    previous: Option<&ItemState>,
    item: &WorkItem,
    poll: u64,
    now: DateTime<Utc>,
) -> ItemState {
    let mut state = previous.cloned().unwrap_or_default();
    if state.last_seen_status.as_deref() != Some(item.status.as_str()) {
        let prior = state.last_seen_status.take();
        state.in_review_origin = if item.status == STATUS_IN_REVIEW {
            prior
        } else {
            None
        };
        state.last_seen_status = Some(item.status.clone());
        state.status_since_poll = poll;
        state.status_since_at = Some(now);
        state.reviewer_dispatches_for_current_status = 0;
    }
    if item.updated_at.is_some() && item.updated_at != state.last_activity_indicator {
        state.last_activity_indicator.clone_from(&item.updated_at);
        state.last_activity_at = Some(now);
    }
    if state.last_activity_at.is_none() {
        state.last_activity_at = Some(now);
    }
    state
}

/// Role to dispatch for the item's status, with the review alternation applied.
fn effective_role(state: &ItemState, status: &str) -> Option<Role> {
    match dispatch_role(status)? {
        Role::Reviewer if awaiting_executor_fix(state) => Some(Role::Executor),
        role => Some(role),
    }
}

/// A failed review with no executor response recorded after it.
fn awaiting_executor_fix(state: &ItemState) -> bool {
    if state.last_reviewer_outcome != Some(ReviewerOutcome::Fail) {
        return false;
    }
    match (state.last_reviewer_feedback_at, state.last_executor_response_at) {
        (_, None) => true,
        (Some(feedback), Some(response)) => response <= feedback,
        (None, Some(_)) => false,
    }
}

fn reviewer_retry_due(state: &ItemState, role: Role, poll: u64, limits: &PlanLimits) -> bool {
    if role != Role::Reviewer
        || state.reviewer_dispatches_for_current_status >= limits.max_reviewer_dispatches_per_status
    {
        return false;
    }
    state
        .last_dispatched_poll
        .is_some_and(|last| poll.saturating_sub(last) > u64::from(limits.reviewer_retry_polls))
}

fn build_intent(role: Role, run_id: &str, item: &WorkItem, sprint: &str) -> RunIntent {
    let (endpoint, body) = if role == Role::Executor && item.status != STATUS_IN_REVIEW {
        (
            EXECUTOR_ENDPOINT,
            IntentBody::ClaimReady {
                role,
                run_id: run_id.to_string(),
                sprint: sprint.to_string(),
            },
        )
    } else {
        (
            REVIEWER_ENDPOINT,
            IntentBody::LinkedPr {
                role,
                issue_number: item.issue_number,
                run_id: run_id.to_string(),
            },
        )
    };
    RunIntent {
        role,
        run_id: run_id.to_string(),
        endpoint: endpoint.to_string(),
        body,
    }
}
