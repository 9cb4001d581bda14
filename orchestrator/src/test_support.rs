//! Test-only helpers: board items, scripted collaborators and temp workspaces.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::run_ids::RunIdGenerator;
use crate::core::types::{OrchestratorState, RunIntent, WorkItem};
use crate::io::board::{BoardSource, MalformedItemData, TransientBoardError};
use crate::io::config::{OrchestratorConfig, write_config};
use crate::io::emit::{Emitter, Record};
use crate::io::init::{InitOptions, OrchestratorPaths, init_orchestrator};
use crate::io::state_store::{load_state, write_state};

/// Create a deterministic `Sprint 1` item with id `PVT_<number>`.
pub fn work_item(number: u64, status: &str) -> WorkItem {
    WorkItem {
        issue_number: number,
        item_id: format!("PVT_{number}"),
        sprint: "Sprint 1".to_string(),
        status: status.to_string(),
        title: format!("Issue {number}"),
        labels: Vec::new(),
        priority: None,
        plan_order: None,
        depends_on: Vec::new(),
        touch_paths: Vec::new(),
        updated_at: None,
    }
}

/// Create an item with file-touch hints and raw dependency refs.
pub fn scoped_item(number: u64, status: &str, touch: &[&str], depends_on: &[&str]) -> WorkItem {
    WorkItem {
        touch_paths: touch.iter().map(|path| path.to_string()).collect(),
        depends_on: depends_on.iter().map(|dep| dep.to_string()).collect(),
        ..work_item(number, status)
    }
}

/// Fixed clock used across tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Run ids `run-1`, `run-2`, ...
#[derive(Debug, Default)]
pub struct SequentialRunIds {
    next: u64,
}

impl SequentialRunIds {
    pub fn issued(&self) -> u64 {
        self.next
    }
}

impl RunIdGenerator for SequentialRunIds {
    fn next_run_id(&mut self) -> String {
        self.next += 1;
        format!("run-{}", self.next)
    }
}

/// One scripted board response.
#[derive(Debug, Clone)]
pub enum ScriptedFetch {
    Items(Vec<WorkItem>),
    Transient(String),
    Malformed(String),
}

/// Board that replays a script, then keeps returning `fallback` (if any).
#[derive(Debug, Default)]
pub struct ScriptedBoard {
    script: RefCell<VecDeque<ScriptedFetch>>,
    fallback: Option<Vec<WorkItem>>,
    fetches: Cell<usize>,
}

impl ScriptedBoard {
    pub fn new(script: Vec<ScriptedFetch>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            ..Self::default()
        }
    }

    pub fn always(items: Vec<WorkItem>) -> Self {
        Self {
            fallback: Some(items),
            ..Self::default()
        }
    }

    pub fn then_always(mut self, items: Vec<WorkItem>) -> Self {
        self.fallback = Some(items);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

impl BoardSource for ScriptedBoard {
    fn fetch(&self) -> Result<Vec<WorkItem>> {
        self.fetches.set(self.fetches.get() + 1);
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedFetch::Items(items)) => Ok(items),
            Some(ScriptedFetch::Transient(message)) => Err(TransientBoardError(message).into()),
            Some(ScriptedFetch::Malformed(message)) => Err(MalformedItemData {
                violations: vec![message],
            }
            .into()),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("board script exhausted")),
        }
    }
}

/// Emitter that keeps every record in memory.
#[derive(Debug, Default)]
pub struct CapturingEmitter {
    pub records: Vec<Record>,
}

impl CapturingEmitter {
    /// The `type` tag of each record, in emission order.
    pub fn types(&self) -> Vec<&'static str> {
        self.records
            .iter()
            .map(|record| match record {
                Record::RunIntent(_) => "RUN_INTENT",
                Record::DispatchSummary(_) => "DISPATCH_SUMMARY",
                Record::EndOfSprintSummary(_) => "END_OF_SPRINT_SUMMARY",
            })
            .collect()
    }

    pub fn intents(&self) -> Vec<&RunIntent> {
        self.records
            .iter()
            .filter_map(|record| match record {
                Record::RunIntent(intent) => Some(intent),
                _ => None,
            })
            .collect()
    }
}

impl Emitter for CapturingEmitter {
    fn emit(&mut self, record: &Record) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Temporary project root with an initialized `.orchestrator/` directory.
pub struct TestWorkspace {
    temp: TempDir,
    paths: OrchestratorPaths,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = init_orchestrator(temp.path(), &InitOptions { force: false })?;
        Ok(Self { temp, paths })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> &OrchestratorPaths {
        &self.paths
    }

    pub fn write_config(&self, config: &OrchestratorConfig) -> Result<()> {
        write_config(&self.paths.config_path, config)
    }

    pub fn read_state(&self) -> Result<OrchestratorState> {
        Ok(load_state(&self.paths.state_path, fixed_now())?.state)
    }

    pub fn write_state(&self, state: &OrchestratorState) -> Result<()> {
        write_state(&self.paths.state_path, state)
    }
}
