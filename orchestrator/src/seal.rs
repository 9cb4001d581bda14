//! Sprint sealing: freeze ownership and dependency metadata before dispatch.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::ownership::{IsolationMode, PlanIssue, compute_sprint_plan_metadata};
use crate::core::run_plan::validate_items;
use crate::core::sanitizer::{
    CycleError, DependencyGraphNode, DroppedEdge, SanitizedNode, find_cycles,
    sanitize_dependency_graph,
};
use crate::core::types::{OrchestratorState, SprintPlan, WorkItem};
use crate::io::board::BoardSource;
use crate::io::config::load_config;
use crate::io::init::OrchestratorPaths;
use crate::io::state_store::{load_state, write_state};

/// The combined dependency graph still has cycles; the seal is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("seal rejected: {0}")]
pub struct DependencyCycleError(pub CycleError);

/// The sprint already has a sealed plan and `reseal` was not requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sprint '{0}' is already sealed (use --reseal to replace its plan)")]
pub struct AlreadySealed(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealOutcome {
    pub sprint: String,
    pub issues: usize,
    pub chained: usize,
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Seal `sprint`: compute ownership, sanitize the declared dependencies, layer
/// them on top of the generated chains, reject cycles, and persist the plan.
///
/// Per-item state from the previous sprint is dropped; `poll_count` is kept.
pub fn seal_sprint<B: BoardSource + ?Sized>(
    root: &Path,
    board: &B,
    sprint: &str,
    reseal: bool,
    now: DateTime<Utc>,
) -> Result<SealOutcome> {
    let paths = OrchestratorPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let policy = config.status_policy()?;
    let sprint = sprint.trim();

    let previous = load_state(&paths.state_path, now)?.state;
    let sealed = previous
        .sprint_plan
        .as_ref()
        .is_some_and(|plan| plan.sprint == sprint);
    if sealed && !reseal {
        return Err(AlreadySealed(sprint.to_string()).into());
    }

    let items = board.fetch()?;
    validate_items(&items, &policy, sprint)?;
    let mut in_sprint: Vec<&WorkItem> = items
        .iter()
        .filter(|item| item.sprint.trim() == sprint)
        .collect();
    in_sprint.sort_by_key(|item| (item.issue_number, item.item_id.clone()));

    let issues: Vec<PlanIssue> = in_sprint.iter().map(|item| PlanIssue::from(*item)).collect();
    let mut metadata = compute_sprint_plan_metadata(
        &issues,
        &config.ownership.buckets,
        &config.ownership.shared_core_paths,
    );

    let nodes: Vec<DependencyGraphNode> = in_sprint
        .iter()
        .filter_map(|item| {
            let entry = metadata.sprint_plan.get(&item.issue_number)?;
            let mut seen = BTreeSet::new();
            let depends_on = item
                .depends_on
                .iter()
                .map(|raw| raw.trim().to_string())
                .filter(|dep| seen.insert(dep.clone()))
                .collect();
            Some(DependencyGraphNode {
                number: item.issue_number,
                depends_on,
                owns_paths: entry.owns_paths.clone(),
                touch_paths: item.touch_paths.clone(),
            })
        })
        .collect();

    // Only declared refs are pruned; chain edges are always kept.
    let graph = sanitize_dependency_graph(&nodes);
    for edge in &graph.report.dropped_edges {
        warn!(from = edge.from, to = %edge.to, reason = ?edge.reason, "dropped dependency edge");
    }
    let mut combined: Vec<SanitizedNode> = graph.items;
    for node in &mut combined {
        if let Some(entry) = metadata.sprint_plan.get_mut(&node.number) {
            let mut depends_on = entry.depends_on.clone();
            for dep in &node.depends_on {
                if !depends_on.contains(dep) {
                    depends_on.push(*dep);
                }
            }
            entry.depends_on.clone_from(&depends_on);
            node.depends_on = depends_on;
        }
    }
    let cycles = find_cycles(&combined);
    if !cycles.is_empty() {
        return Err(DependencyCycleError(CycleError { cycles }).into());
    }

    let chained = metadata
        .sprint_plan
        .values()
        .filter(|entry| entry.isolation_mode == IsolationMode::Chained)
        .count();
    let outcome = SealOutcome {
        sprint: sprint.to_string(),
        issues: metadata.sprint_plan.len(),
        chained,
        dropped_edges: graph.report.dropped_edges.clone(),
    };

    let state = OrchestratorState {
        poll_count: previous.poll_count,
        items: Default::default(),
        sprint_plan: Some(SprintPlan {
            sprint: sprint.to_string(),
            sealed_at: now,
            issues: metadata.sprint_plan,
            dropped_edges: graph.report.dropped_edges,
        }),
        ownership_index: Some(metadata.ownership_index),
        end_of_sprint_reported: None,
    };
    write_state(&paths.state_path, &state)?;
    info!(
        sprint = %outcome.sprint,
        issues = outcome.issues,
        chained = outcome.chained,
        dropped = outcome.dropped_edges.len(),
        "sprint sealed"
    );
    Ok(outcome)
}
