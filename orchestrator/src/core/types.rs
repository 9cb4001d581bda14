//! Shared deterministic types for the orchestrator core.
//!
//! These types define stable contracts between the planner, the reconciler and
//! the persistence layer. Fields serialize as snake_case and every map is
//! ordered so that persisted state stays byte-stable across runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ownership::SprintOwnershipEntry;
use crate::core::sanitizer::DroppedEdge;

/// Endpoint an EXECUTOR intent claims the next ready item from.
pub const EXECUTOR_ENDPOINT: &str = "/internal/executor/claim-ready-item";
/// Endpoint that resolves the pull request linked to an issue.
pub const REVIEWER_ENDPOINT: &str = "/internal/reviewer/resolve-linked-pr";

/// One board row, decoded strictly at the board boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub issue_number: u64,
    pub item_id: String,
    pub sprint: String,
    pub status: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub plan_order: Option<u32>,
    /// Raw dependency references such as `"#12"`.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Files the issue expects to touch.
    #[serde(default)]
    pub touch_paths: Vec<String>,
    /// Opaque activity marker (for example the board's `updatedAt`).
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Agent role a run intent is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Executor,
    Reviewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Executor => "EXECUTOR",
            Role::Reviewer => "REVIEWER",
        }
    }
}

/// Verdict written back by a reviewer agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewerOutcome {
    Pass,
    Fail,
}

/// Persisted per-item bookkeeping, keyed by `item_id`.
///
/// A status epoch is the pair `(last_seen_status, status_since_poll)`. Fields
/// scoped to the current status are only meaningful inside one epoch and are
/// reset whenever the epoch changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemState {
    pub last_seen_status: Option<String>,
    pub status_since_at: Option<DateTime<Utc>>,
    /// Poll number at which the current status began.
    pub status_since_poll: u64,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_activity_indicator: Option<String>,
    pub last_dispatched_role: Option<Role>,
    pub last_dispatched_status: Option<String>,
    pub last_dispatched_at: Option<DateTime<Utc>>,
    pub last_dispatched_poll: Option<u64>,
    pub last_run_id: Option<String>,
    pub reviewer_dispatches_for_current_status: u32,
    pub review_cycle_count: u32,
    pub last_reviewer_outcome: Option<ReviewerOutcome>,
    pub last_reviewer_feedback_at: Option<DateTime<Utc>>,
    pub last_executor_response_at: Option<DateTime<Utc>>,
    /// Status the item held right before it entered `In Review`.
    pub in_review_origin: Option<String>,
}

impl ItemState {
    /// True when both records describe the same status epoch.
    pub fn same_epoch(&self, other: &ItemState) -> bool {
        self.last_seen_status == other.last_seen_status
            && self.status_since_poll == other.status_since_poll
    }

    /// True when `role` was already dispatched for `status` within the current epoch.
    pub fn dispatched_in_epoch(&self, role: Role, status: &str) -> bool {
        self.last_dispatched_role == Some(role)
            && self.last_dispatched_status.as_deref() == Some(status)
            && self
                .last_dispatched_poll
                .is_some_and(|poll| poll >= self.status_since_poll)
    }
}

/// Ownership and dependency metadata frozen when a sprint is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintPlan {
    pub sprint: String,
    pub sealed_at: DateTime<Utc>,
    pub issues: BTreeMap<u64, SprintOwnershipEntry>,
    #[serde(default)]
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Root of the persisted state file (one per target repository).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorState {
    /// Incremented exactly once per cycle.
    pub poll_count: u64,
    pub items: BTreeMap<String, ItemState>,
    pub sprint_plan: Option<SprintPlan>,
    /// Owned path prefix → issue that exclusively writes it.
    pub ownership_index: Option<BTreeMap<String, u64>>,
    /// Sprint whose end-of-sprint summary has already been emitted.
    pub end_of_sprint_reported: Option<String>,
}

/// Dispatch instruction for one agent role. Created and consumed within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIntent {
    pub role: Role,
    pub run_id: String,
    pub endpoint: String,
    pub body: IntentBody,
}

/// Role-specific intent payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntentBody {
    /// Executor claims the next ready item of the sprint.
    ClaimReady {
        role: Role,
        run_id: String,
        sprint: String,
    },
    /// Agent acts on the pull request linked to an issue.
    LinkedPr {
        role: Role,
        issue_number: u64,
        run_id: String,
    },
}
