//! Ownership buckets, write conflicts and chained execution order.
//!
//! Computed once when a sprint is sealed. Each issue's file-touch hints are
//! folded into directory buckets; the most-touched bucket (plus any shared-core
//! path) is owned by the issue. Issues whose owned paths overlap conflict, and
//! conflicting or shared-core issues are chained into a strict linear order per
//! ownership group.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::path::{BucketSet, any_overlap, normalize_path};
use crate::core::types::WorkItem;

/// Group assigned to sprint goal meta-issues.
pub const GOAL_GROUP: &str = "meta:sprint-goal";
/// Group for issues that touch nothing bucketable.
pub const UNSCOPED_GROUP: &str = "component:unscoped";
/// Labels that mark a sprint goal meta-issue.
pub const GOAL_LABELS: [&str; 2] = ["sprint-goal", "goal"];

static GOAL_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\[\s*sprint\s+goal\s*\]|sprint\s+goal\s*:|goal\s*:)")
        .expect("goal title regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IsolationMode {
    Isolated,
    Chained,
}

/// Issue as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanIssue {
    pub number: u64,
    pub title: String,
    pub labels: Vec<String>,
    pub priority: Option<String>,
    pub plan_order: Option<u32>,
    pub touch_paths: Vec<String>,
}

impl From<&WorkItem> for PlanIssue {
    fn from(item: &WorkItem) -> Self {
        Self {
            number: item.issue_number,
            title: item.title.clone(),
            labels: item.labels.clone(),
            priority: item.priority.clone(),
            plan_order: item.plan_order,
            touch_paths: item.touch_paths.clone(),
        }
    }
}

/// Per-issue ownership metadata frozen at seal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintOwnershipEntry {
    /// Buckets the issue's declared files fall into, sorted and deduplicated.
    pub touch_paths: Vec<String>,
    /// Buckets this issue exclusively owns.
    pub owns_paths: Vec<String>,
    /// Issues whose owned paths overlap this one, ascending.
    pub conflicts_with: Vec<u64>,
    /// Issues that must complete first.
    pub depends_on: Vec<u64>,
    pub isolation_mode: IsolationMode,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintPlanMetadata {
    pub sprint_plan: BTreeMap<u64, SprintOwnershipEntry>,
    /// Owned path → first issue (in global order) that claims it.
    pub ownership_index: BTreeMap<String, u64>,
}

/// Compute ownership, conflicts, isolation and chain dependencies for a sprint.
pub fn compute_sprint_plan_metadata<B: AsRef<str>, S: AsRef<str>>(
    issues: &[PlanIssue],
    buckets: &[B],
    shared_core_paths: &[S],
) -> SprintPlanMetadata {
    let buckets = BucketSet::new(buckets);
    let shared: BTreeSet<String> = shared_core_paths
        .iter()
        .map(|path| normalize_path(path.as_ref()))
        .filter(|path| !path.is_empty())
        .collect();

    let mut entries: BTreeMap<u64, SprintOwnershipEntry> = BTreeMap::new();
    let mut by_number: BTreeMap<u64, &PlanIssue> = BTreeMap::new();
    for issue in issues {
        if by_number.contains_key(&issue.number) {
            continue;
        }
        by_number.insert(issue.number, issue);
        entries.insert(issue.number, draft_entry(issue, &buckets, &shared));
    }

    let numbers: Vec<u64> = entries.keys().copied().collect();
    for (pos, left) in numbers.iter().enumerate() {
        for right in &numbers[pos + 1..] {
            if any_overlap(&entries[left].owns_paths, &entries[right].owns_paths) {
                if let Some(entry) = entries.get_mut(left) {
                    entry.conflicts_with.push(*right);
                }
                if let Some(entry) = entries.get_mut(right) {
                    entry.conflicts_with.push(*left);
                }
            }
        }
    }

    for (number, entry) in &mut entries {
        entry.conflicts_with.sort_unstable();
        if by_number[number].is_goal() {
            continue;
        }
        let owns_shared: Vec<&String> = entry
            .owns_paths
            .iter()
            .filter(|path| shared.contains(*path))
            .collect();
        if !entry.conflicts_with.is_empty() || !owns_shared.is_empty() {
            entry.isolation_mode = IsolationMode::Chained;
        }
        entry.group_id = match (owns_shared.first(), entry.owns_paths.first()) {
            (Some(path), _) => format!("shared:{path}"),
            (None, Some(path)) => format!("component:{path}"),
            (None, None) => UNSCOPED_GROUP.to_string(),
        };
    }

    let mut chains: BTreeMap<String, Vec<&PlanIssue>> = BTreeMap::new();
    for (number, entry) in &entries {
        if entry.isolation_mode == IsolationMode::Chained {
            chains
                .entry(entry.group_id.clone())
                .or_default()
                .push(by_number[number]);
        }
    }
    for chain in chains.values_mut() {
        chain.sort_by(|a, b| chain_order(a, b));
        for pair in chain.windows(2) {
            if let Some(entry) = entries.get_mut(&pair[1].number) {
                entry.depends_on = vec![pair[0].number];
            }
        }
    }

    let mut global: Vec<&PlanIssue> = by_number.values().copied().collect();
    global.sort_by(|a, b| {
        entries[&a.number]
            .group_id
            .cmp(&entries[&b.number].group_id)
            .then_with(|| chain_order(a, b))
    });
    let mut ownership_index = BTreeMap::new();
    for issue in global {
        for path in &entries[&issue.number].owns_paths {
            ownership_index.entry(path.clone()).or_insert(issue.number);
        }
    }

    SprintPlanMetadata {
        sprint_plan: entries,
        ownership_index,
    }
}

fn draft_entry(
    issue: &PlanIssue,
    buckets: &BucketSet,
    shared: &BTreeSet<String>,
) -> SprintOwnershipEntry {
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for path in &issue.touch_paths {
        if let Some(bucket) = buckets.bucket_for(path) {
            *tally.entry(bucket).or_default() += 1;
        }
    }
    let touch_paths: Vec<String> = tally.keys().cloned().collect();

    let mut owns: BTreeSet<String> = BTreeSet::new();
    if !issue.is_goal() {
        // Ascending iteration plus a strict comparison keeps the smallest bucket on ties.
        let mut primary: Option<(&String, usize)> = None;
        for (bucket, count) in &tally {
            if primary.is_none_or(|(_, best)| *count > best) {
                primary = Some((bucket, *count));
            }
        }
        if let Some((bucket, _)) = primary {
            owns.insert(bucket.clone());
        }
        owns.extend(tally.keys().filter(|bucket| shared.contains(*bucket)).cloned());
    }

    SprintOwnershipEntry {
        touch_paths,
        owns_paths: owns.into_iter().collect(),
        conflicts_with: Vec::new(),
        depends_on: Vec::new(),
        isolation_mode: IsolationMode::Isolated,
        group_id: GOAL_GROUP.to_string(),
    }
}

impl PlanIssue {
    /// Sprint goal meta-issues never receive ownership.
    pub fn is_goal(&self) -> bool {
        GOAL_TITLE_RE.is_match(&self.title)
            || self.labels.iter().any(|label| {
                GOAL_LABELS
                    .iter()
                    .any(|goal| label.trim().eq_ignore_ascii_case(goal))
            })
    }

    /// `P0 < P1 < P2 < anything else`.
    pub fn priority_rank(&self) -> u8 {
        match self
            .priority
            .as_deref()
            .map(|p| p.trim().to_ascii_uppercase())
            .as_deref()
        {
            Some("P0") => 0,
            Some("P1") => 1,
            Some("P2") => 2,
            _ => 3,
        }
    }
}

/// `(priority rank, plan order, title, issue number)`; missing plan order sorts last.
fn chain_order(a: &PlanIssue, b: &PlanIssue) -> Ordering {
    a.priority_rank()
        .cmp(&b.priority_rank())
        .then_with(|| {
            a.plan_order
                .unwrap_or(u32::MAX)
                .cmp(&b.plan_order.unwrap_or(u32::MAX))
        })
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.number.cmp(&b.number))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(number: u64, title: &str, priority: Option<&str>, touch: &[&str]) -> PlanIssue {
        PlanIssue {
            number,
            title: title.to_string(),
            labels: Vec::new(),
            priority: priority.map(str::to_string),
            plan_order: None,
            touch_paths: touch.iter().map(|s| s.to_string()).collect(),
        }
    }

    const NO_BUCKETS: [&str; 0] = [];

    #[test]
    fn primary_bucket_is_most_touched_with_ascending_tie_break() {
        let plan = compute_sprint_plan_metadata(
            &[
                issue(1, "a", None, &["apps/web/a.ts", "apps/web/b.ts", "apps/api/x.rs"]),
                issue(2, "b", None, &["zeta/a", "alpha/b"]),
            ],
            &["apps/web", "apps/api"],
            &NO_BUCKETS,
        );
        let first = &plan.sprint_plan[&1];
        assert_eq!(first.touch_paths, vec!["apps/api", "apps/web"]);
        assert_eq!(first.owns_paths, vec!["apps/web"]);
        assert_eq!(plan.sprint_plan[&2].owns_paths, vec!["alpha"]);
        assert_eq!(first.isolation_mode, IsolationMode::Isolated);
        assert_eq!(first.group_id, "component:apps/web");
    }

    #[test]
    fn overlapping_owners_conflict_and_chain() {
        let plan = compute_sprint_plan_metadata(
            &[
                issue(7, "later", Some("P2"), &["apps/api/src/a.rs"]),
                issue(3, "first", Some("P0"), &["apps/api/b.rs"]),
            ],
            &["apps/api"],
            &NO_BUCKETS,
        );
        let seven = &plan.sprint_plan[&7];
        let three = &plan.sprint_plan[&3];
        assert_eq!(seven.conflicts_with, vec![3]);
        assert_eq!(three.conflicts_with, vec![7]);
        assert_eq!(seven.isolation_mode, IsolationMode::Chained);
        assert_eq!(three.isolation_mode, IsolationMode::Chained);
        assert!(three.depends_on.is_empty());
        assert_eq!(seven.depends_on, vec![3]);
        assert_eq!(plan.ownership_index["apps/api"], 3);
    }

    #[test]
    fn shared_core_paths_force_shared_ownership() {
        let plan = compute_sprint_plan_metadata(
            &[
                issue(1, "deps", None, &["src/a.rs", "src/b.rs", "Cargo.lock"]),
                issue(2, "other deps", None, &["lib/x.rs", "Cargo.lock"]),
                issue(3, "alone", None, &["tools/y.rs"]),
            ],
            &NO_BUCKETS,
            &["Cargo.lock", "./Cargo.toml"],
        );
        let first = &plan.sprint_plan[&1];
        assert_eq!(first.owns_paths, vec!["Cargo.lock", "src"]);
        assert_eq!(first.group_id, "shared:Cargo.lock");
        assert_eq!(first.isolation_mode, IsolationMode::Chained);
        assert_eq!(plan.sprint_plan[&2].depends_on, vec![1]);
        assert_eq!(plan.sprint_plan[&3].isolation_mode, IsolationMode::Isolated);
        assert!(plan.sprint_plan[&3].depends_on.is_empty());
    }

    #[test]
    fn chains_are_linear_in_priority_plan_order_title_number() {
        let mut a = issue(10, "b", Some("P1"), &["core/a"]);
        a.plan_order = Some(2);
        let mut b = issue(11, "a", Some("P1"), &["core/b"]);
        b.plan_order = Some(2);
        let mut c = issue(12, "z", Some("P1"), &["core/c"]);
        c.plan_order = Some(1);
        let d = issue(13, "y", Some("p0"), &["core/d"]);
        let e = issue(14, "x", None, &["core/e"]);
        let plan = compute_sprint_plan_metadata(&[a, b, c, d, e], &["core"], &NO_BUCKETS);

        // Order: 13 (P0), 12 (P1, order 1), 11 (P1, order 2, "a"), 10 ("b"), 14 (unknown).
        assert!(plan.sprint_plan[&13].depends_on.is_empty());
        assert_eq!(plan.sprint_plan[&12].depends_on, vec![13]);
        assert_eq!(plan.sprint_plan[&11].depends_on, vec![12]);
        assert_eq!(plan.sprint_plan[&10].depends_on, vec![11]);
        assert_eq!(plan.sprint_plan[&14].depends_on, vec![10]);
        assert_eq!(plan.sprint_plan[&10].conflicts_with, vec![11, 12, 13, 14]);
    }

    #[test]
    fn goal_issues_never_own_paths() {
        let mut labelled = issue(2, "Ship search", None, &["apps/api/a.rs"]);
        labelled.labels = vec!["Sprint-Goal".to_string()];
        let plan = compute_sprint_plan_metadata(
            &[
                issue(1, "[Sprint Goal] Search v1", None, &["apps/api/a.rs"]),
                labelled,
                issue(3, "Implement search", None, &["apps/api/b.rs"]),
            ],
            &["apps/api"],
            &NO_BUCKETS,
        );
        for number in [1, 2] {
            let entry = &plan.sprint_plan[&number];
            assert!(entry.owns_paths.is_empty());
            assert_eq!(entry.group_id, GOAL_GROUP);
            assert_eq!(entry.isolation_mode, IsolationMode::Isolated);
            assert!(entry.conflicts_with.is_empty());
        }
        assert_eq!(plan.sprint_plan[&1].touch_paths, vec!["apps/api"]);
        assert_eq!(plan.sprint_plan[&3].isolation_mode, IsolationMode::Isolated);
        assert_eq!(plan.ownership_index.get("apps/api"), Some(&3));
    }

    #[test]
    fn issues_without_touch_paths_are_unscoped() {
        let plan = compute_sprint_plan_metadata(&[issue(4, "t", None, &[])], &NO_BUCKETS, &NO_BUCKETS);
        let entry = &plan.sprint_plan[&4];
        assert_eq!(entry.group_id, UNSCOPED_GROUP);
        assert!(entry.owns_paths.is_empty());
        assert!(plan.ownership_index.is_empty());
    }
}
