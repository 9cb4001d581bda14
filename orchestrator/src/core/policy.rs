//! Status policy and the fixed status → role classification.

use std::collections::BTreeSet;

use crate::core::error::PlanError;
use crate::core::types::Role;

pub const STATUS_BACKLOG: &str = "Backlog";
pub const STATUS_READY: &str = "Ready";
pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_IN_REVIEW: &str = "In Review";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_BLOCKED: &str = "Blocked";

/// Statuses that keep a sprint open.
pub const ACTIVE_STATUSES: [&str; 3] = [STATUS_READY, STATUS_IN_PROGRESS, STATUS_IN_REVIEW];

/// Allowed board status values, supplied explicitly to every planning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    allowed: BTreeSet<String>,
}

impl StatusPolicy {
    /// Build a policy from the allowed status list.
    ///
    /// Rejects an empty list, blank entries and duplicates.
    pub fn new<I, S>(statuses: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed = BTreeSet::new();
        for status in statuses {
            let status = status.into();
            if status.trim().is_empty() {
                return Err(PlanError::Validation(
                    "allowed statuses must not contain blank entries".to_string(),
                ));
            }
            if !allowed.insert(status.clone()) {
                return Err(PlanError::Validation(format!(
                    "duplicate allowed status '{status}'"
                )));
            }
        }
        if allowed.is_empty() {
            return Err(PlanError::Validation(
                "allowed statuses must be non-empty".to_string(),
            ));
        }
        Ok(Self { allowed })
    }

    pub fn allows(&self, status: &str) -> bool {
        self.allowed.contains(status)
    }
}

/// Default board statuses used when configuration does not override them.
pub fn default_statuses() -> Vec<String> {
    [
        STATUS_BACKLOG,
        STATUS_READY,
        STATUS_IN_PROGRESS,
        STATUS_IN_REVIEW,
        STATUS_DONE,
        STATUS_BLOCKED,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Role dispatched for a status. New statuses are not dispatchable until they
/// are listed here.
pub fn dispatch_role(status: &str) -> Option<Role> {
    match status {
        STATUS_READY => Some(Role::Executor),
        STATUS_IN_REVIEW => Some(Role::Reviewer),
        _ => None,
    }
}

pub fn is_active(status: &str) -> bool {
    ACTIVE_STATUSES.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_empty_list() {
        let err = StatusPolicy::new(Vec::<String>::new()).expect_err("empty policy");
        assert!(matches!(err, PlanError::Validation(_)));
    }

    #[test]
    fn policy_rejects_duplicates() {
        let err = StatusPolicy::new(["Ready", "Ready"]).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate allowed status 'Ready'"));
    }

    #[test]
    fn only_ready_and_in_review_dispatch() {
        assert_eq!(dispatch_role(STATUS_READY), Some(Role::Executor));
        assert_eq!(dispatch_role(STATUS_IN_REVIEW), Some(Role::Reviewer));
        for status in [STATUS_BACKLOG, STATUS_IN_PROGRESS, STATUS_DONE, STATUS_BLOCKED] {
            assert_eq!(dispatch_role(status), None, "{status}");
        }
    }

    #[test]
    fn backlog_is_not_active() {
        assert!(!is_active(STATUS_BACKLOG));
        assert!(is_active(STATUS_IN_PROGRESS));
    }
}
