//! Board snapshot boundary.
//!
//! Raw board JSON is checked against the embedded snapshot schema and then
//! decoded into typed [`WorkItem`]s. Nothing downstream sees untyped data.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::types::WorkItem;
use crate::io::config::BoardConfig;
use crate::io::process::run_command_with_timeout;

const SNAPSHOT_SCHEMA: &str = include_str!("../../schemas/board_snapshot.v1.schema.json");

static SNAPSHOT_VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(SNAPSHOT_SCHEMA).map_err(|err| err.to_string())?;
    validator_for(&schema).map_err(|err| err.to_string())
});

/// Board data that violates the item contract. Fatal for the cycle, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed board data: {}", .violations.join("; "))]
pub struct MalformedItemData {
    pub violations: Vec<String>,
}

/// Board fetch failed in a way that may succeed on retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transient board failure: {0}")]
pub struct TransientBoardError(pub String);

/// Source of board snapshots.
pub trait BoardSource {
    fn fetch(&self) -> Result<Vec<WorkItem>>;
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    items: Vec<WorkItem>,
}

/// Validate and decode a raw snapshot document.
pub fn decode_snapshot(raw: &str) -> Result<Vec<WorkItem>> {
    let value: Value = serde_json::from_str(raw).map_err(|err| MalformedItemData {
        violations: vec![format!("invalid JSON: {err}")],
    })?;
    let validator = SNAPSHOT_VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid snapshot schema: {err}"))?;
    let violations: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(MalformedItemData { violations }.into());
    }
    let snapshot: Snapshot = serde_json::from_value(value).map_err(|err| MalformedItemData {
        violations: vec![err.to_string()],
    })?;
    debug!(items = snapshot.items.len(), "board snapshot decoded");
    Ok(snapshot.items)
}

/// Reads a snapshot JSON file written by an external exporter.
#[derive(Debug, Clone)]
pub struct SnapshotFileBoard {
    path: PathBuf,
}

impl SnapshotFileBoard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BoardSource for SnapshotFileBoard {
    fn fetch(&self) -> Result<Vec<WorkItem>> {
        let raw = fs::read_to_string(&self.path).map_err(|err| {
            TransientBoardError(format!("read snapshot {}: {err}", self.path.display()))
        })?;
        decode_snapshot(&raw).with_context(|| format!("decode snapshot {}", self.path.display()))
    }
}

/// Runs an external command that prints a snapshot on stdout.
#[derive(Debug, Clone)]
pub struct CommandBoard {
    command: Vec<String>,
    cwd: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBoard {
    pub fn new(
        command: Vec<String>,
        cwd: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            command,
            cwd: cwd.into(),
            timeout,
            output_limit_bytes,
        }
    }
}

impl BoardSource for CommandBoard {
    fn fetch(&self) -> Result<Vec<WorkItem>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("board command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.cwd);

        info!(program = %program, "fetching board snapshot");
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)?;
        if output.timed_out {
            return Err(TransientBoardError(format!(
                "{program} timed out after {}s",
                self.timeout.as_secs()
            ))
            .into());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransientBoardError(format!(
                "{program} exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ))
            .into());
        }
        if output.stdout_truncated > 0 {
            return Err(MalformedItemData {
                violations: vec![format!(
                    "snapshot exceeds {} bytes",
                    self.output_limit_bytes
                )],
            }
            .into());
        }
        let raw = String::from_utf8(output.stdout).map_err(|err| MalformedItemData {
            violations: vec![format!("snapshot is not UTF-8: {err}")],
        })?;
        decode_snapshot(&raw)
    }
}

/// Board source described by configuration, rooted at the project directory.
pub fn board_from_config(root: &Path, config: &BoardConfig) -> Box<dyn BoardSource> {
    if config.command.is_empty() {
        Box::new(SnapshotFileBoard::new(root.join(config.snapshot_path())))
    } else {
        Box::new(CommandBoard::new(
            config.command.clone(),
            root,
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        ))
    }
}
