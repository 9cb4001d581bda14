//! One orchestrator poll: load, plan, reconcile, persist, emit.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::reconcile::merge_runner_managed_state_fields;
use crate::core::run_ids::RunIdGenerator;
use crate::core::run_plan::{DispatchSummary, PlanRequest, build_run_plan};
use crate::core::types::{OrchestratorState, WorkItem};
use crate::io::board::BoardSource;
use crate::io::config::{ConfigError, OrchestratorConfig, load_config};
use crate::io::emit::{Emitter, EndOfSprintSummary, Record};
use crate::io::init::OrchestratorPaths;
use crate::io::state_store::{load_state, write_state};
use crate::io::summary_text::render_summary_text;

/// Per-invocation overrides for a cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Overrides the configured sprint.
    pub sprint: Option<String>,
    /// Fixed clock; `None` uses the current time.
    pub now: Option<DateTime<Utc>>,
}

/// Result of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub sprint: String,
    pub poll_count: u64,
    pub intents: usize,
    pub summary: DispatchSummary,
    pub completed: bool,
    /// True when this cycle emitted `END_OF_SPRINT_SUMMARY`.
    pub end_of_sprint_emitted: bool,
    /// Backup path if a corrupt state file was moved aside during this cycle.
    pub recovered_state: Option<PathBuf>,
}

/// Sprint to plan for: the override, else the configured sprint.
pub fn resolve_sprint(options: &CycleOptions, config: &OrchestratorConfig) -> Result<String> {
    options
        .sprint
        .as_deref()
        .or(config.sprint.as_deref())
        .map(str::trim)
        .filter(|sprint| !sprint.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError("no sprint configured (set `sprint` in config.toml or pass --sprint)".to_string())
                .into()
        })
}

/// Run one poll.
///
/// Nothing is written or emitted when the board fetch or planning fails. The
/// state file is re-read right before writing and merged with the planned
/// state so feedback written by agents in the meantime survives.
pub fn run_cycle<B, E, G>(
    root: &Path,
    board: &B,
    emitter: &mut E,
    ids: &mut G,
    options: &CycleOptions,
) -> Result<CycleOutcome>
where
    B: BoardSource + ?Sized,
    E: Emitter + ?Sized,
    G: RunIdGenerator + ?Sized,
{
    let paths = OrchestratorPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let policy = config.status_policy()?;
    let sprint = resolve_sprint(options, &config)?;
    let now = options.now.unwrap_or_else(Utc::now);

    let loaded = load_state(&paths.state_path, now)?;
    let mut recovered_state = loaded.recovered_from;

    let items = board.fetch().context("fetch board")?;
    let request = PlanRequest {
        items: &items,
        policy: &policy,
        sprint: &sprint,
        limits: config.limits,
        now,
    };
    let plan = build_run_plan(&request, &loaded.state, ids)?;
    debug!(poll_count = plan.next_state.poll_count, intents = plan.intents.len(), "plan built");

    let disk = load_state(&paths.state_path, now)?;
    if disk.recovered_from.is_some() {
        warn!("state file became corrupt during the cycle; merging against empty state");
        recovered_state = disk.recovered_from;
    }
    let mut merged = merge_runner_managed_state_fields(plan.next_state, &disk.state);

    let report_end_of_sprint =
        plan.completed && merged.end_of_sprint_reported.as_deref() != Some(sprint.as_str());
    if report_end_of_sprint {
        merged.end_of_sprint_reported = Some(sprint.clone());
    } else if !plan.completed && merged.end_of_sprint_reported.as_deref() == Some(sprint.as_str()) {
        merged.end_of_sprint_reported = None;
    }
    write_state(&paths.state_path, &merged)
        .with_context(|| format!("write {}", paths.state_path.display()))?;

    for intent in &plan.intents {
        emitter.emit(&Record::RunIntent(intent.clone()))?;
    }
    emitter.emit(&Record::DispatchSummary(plan.summary.clone()))?;
    if report_end_of_sprint {
        let end = end_of_sprint_summary(&sprint, &items, &merged, &plan.summary);
        emitter.emit(&Record::EndOfSprintSummary(end))?;
        info!(sprint = %sprint, poll_count = merged.poll_count, "sprint complete");
    }

    match render_summary_text(&plan.summary) {
        Ok(text) => info!("{text}"),
        Err(err) => warn!(err = %err, "failed to render dispatch summary"),
    }

    Ok(CycleOutcome {
        sprint,
        poll_count: merged.poll_count,
        intents: plan.intents.len(),
        summary: plan.summary,
        completed: plan.completed,
        end_of_sprint_emitted: report_end_of_sprint,
        recovered_state,
    })
}

fn end_of_sprint_summary(
    sprint: &str,
    items: &[WorkItem],
    state: &OrchestratorState,
    summary: &DispatchSummary,
) -> EndOfSprintSummary {
    let in_scope: BTreeSet<&str> = items
        .iter()
        .filter(|item| item.sprint.trim() == sprint)
        .map(|item| item.item_id.trim())
        .collect();
    let total_review_cycles = state
        .items
        .iter()
        .filter(|(item_id, _)| in_scope.contains(item_id.as_str()))
        .map(|(_, item)| item.review_cycle_count)
        .sum();
    EndOfSprintSummary {
        sprint: sprint.to_string(),
        poll_count: state.poll_count,
        items: summary.in_scope,
        status_counts: summary.status_counts.clone(),
        total_review_cycles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PlanError;
    use crate::core::policy::{STATUS_DONE, STATUS_READY};
    use crate::test_support::{
        CapturingEmitter, ScriptedBoard, SequentialRunIds, TestWorkspace, fixed_now, work_item,
    };

    fn options() -> CycleOptions {
        CycleOptions {
            sprint: Some("Sprint 1".to_string()),
            now: Some(fixed_now()),
        }
    }

    #[test]
    fn cycle_persists_state_then_emits_records() {
        let workspace = TestWorkspace::new().expect("workspace");
        let board = ScriptedBoard::always(vec![work_item(1, STATUS_READY), work_item(2, STATUS_DONE)]);
        let mut emitter = CapturingEmitter::default();
        let mut ids = SequentialRunIds::default();

        let outcome =
            run_cycle(workspace.root(), &board, &mut emitter, &mut ids, &options()).expect("cycle");
        assert_eq!(outcome.poll_count, 1);
        assert_eq!(outcome.intents, 1);
        assert!(!outcome.completed);
        assert_eq!(emitter.types(), vec!["RUN_INTENT", "DISPATCH_SUMMARY"]);

        let state = workspace.read_state().expect("state");
        assert_eq!(state.poll_count, 1);
        assert_eq!(state.items["PVT_1"].last_run_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn planning_failure_writes_and_emits_nothing() {
        let workspace = TestWorkspace::new().expect("workspace");
        let mut bad = work_item(1, STATUS_READY);
        bad.status = "Shipped".to_string();
        let board = ScriptedBoard::always(vec![bad]);
        let mut emitter = CapturingEmitter::default();
        let mut ids = SequentialRunIds::default();

        let err = run_cycle(workspace.root(), &board, &mut emitter, &mut ids, &options())
            .expect_err("malformed");
        assert!(matches!(
            err.downcast_ref::<PlanError>(),
            Some(PlanError::MalformedItem(_))
        ));
        assert!(emitter.records.is_empty());
        assert_eq!(workspace.read_state().expect("state"), OrchestratorState::default());
    }

    #[test]
    fn end_of_sprint_is_reported_once() {
        let workspace = TestWorkspace::new().expect("workspace");
        let board = ScriptedBoard::always(vec![work_item(1, STATUS_DONE)]);
        let mut emitter = CapturingEmitter::default();
        let mut ids = SequentialRunIds::default();

        let first =
            run_cycle(workspace.root(), &board, &mut emitter, &mut ids, &options()).expect("cycle");
        assert!(first.completed && first.end_of_sprint_emitted);
        let second =
            run_cycle(workspace.root(), &board, &mut emitter, &mut ids, &options()).expect("cycle");
        assert!(second.completed && !second.end_of_sprint_emitted);
        assert_eq!(
            emitter.types(),
            vec!["DISPATCH_SUMMARY", "END_OF_SPRINT_SUMMARY", "DISPATCH_SUMMARY"]
        );
        assert_eq!(
            workspace.read_state().expect("state").end_of_sprint_reported.as_deref(),
            Some("Sprint 1")
        );
    }

    #[test]
    fn missing_sprint_is_a_config_error() {
        let workspace = TestWorkspace::new().expect("workspace");
        let board = ScriptedBoard::always(Vec::new());
        let mut emitter = CapturingEmitter::default();
        let mut ids = SequentialRunIds::default();
        let err = run_cycle(
            workspace.root(),
            &board,
            &mut emitter,
            &mut ids,
            &CycleOptions::default(),
        )
        .expect_err("no sprint");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
