//! Orchestrator configuration stored under `.orchestrator/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::policy::{StatusPolicy, default_statuses};
use crate::core::run_plan::PlanLimits;

/// Configuration rejected by validation. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid config: {0}")]
pub struct ConfigError(pub String);

/// Orchestrator configuration (TOML).
///
/// Edited by humans. Missing fields default to values that work for a small
/// team board polled once a minute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Target sprint. The CLI `--sprint` flag overrides it.
    pub sprint: Option<String>,

    /// Sleep between cycles in loop mode.
    pub poll_interval_secs: u64,

    /// Retries of a transient board failure before the loop gives up.
    pub transient_retry_limit: u32,

    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,

    pub limits: PlanLimits,
    pub policy: PolicyConfig,
    pub board: BoardConfig,
    pub ownership: OwnershipConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub allowed_statuses: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_statuses: default_statuses(),
        }
    }
}

/// Default snapshot file, relative to the project root.
pub const DEFAULT_SNAPSHOT_PATH: &str = ".orchestrator/board.json";

/// Where board snapshots come from: a JSON file or an external command.
///
/// `command` wins when set; otherwise the snapshot file is read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardConfig {
    /// Snapshot file, relative to the project root.
    pub snapshot_path: Option<PathBuf>,
    /// Command printing a snapshot on stdout (e.g. `["gh","project","..."]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl BoardConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH))
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            command: Vec::new(),
            timeout_secs: 60,
            output_limit_bytes: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Directory prefixes used as ownership buckets.
    pub buckets: Vec<String>,
    /// Paths that always force shared ownership when touched.
    pub shared_core_paths: Vec<String>,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            shared_core_paths: ["Cargo.lock", "Cargo.toml", "package.json", "pnpm-lock.yaml"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sprint: None,
            poll_interval_secs: 60,
            transient_retry_limit: 5,
            backoff_base_secs: 5,
            backoff_max_secs: 300,
            limits: PlanLimits::default(),
            policy: PolicyConfig::default(),
            board: BoardConfig::default(),
            ownership: OwnershipConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError("poll_interval_secs must be > 0".to_string()));
        }
        if self.backoff_base_secs == 0 {
            return Err(ConfigError("backoff_base_secs must be > 0".to_string()));
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            return Err(ConfigError(
                "backoff_max_secs must be >= backoff_base_secs".to_string(),
            ));
        }
        if let Some(sprint) = &self.sprint {
            if sprint.trim().is_empty() {
                return Err(ConfigError("sprint must not be blank".to_string()));
            }
        }
        self.limits
            .validate()
            .map_err(|err| ConfigError(format!("limits: {err}")))?;
        self.status_policy()?;

        let has_command = !self.board.command.is_empty();
        if has_command && self.board.snapshot_path.is_some() {
            return Err(ConfigError(
                "board must not set both snapshot_path and command".to_string(),
            ));
        }
        if has_command && self.board.command[0].trim().is_empty() {
            return Err(ConfigError(
                "board.command must start with a program".to_string(),
            ));
        }
        if self.board.timeout_secs == 0 {
            return Err(ConfigError("board.timeout_secs must be > 0".to_string()));
        }
        if self.board.output_limit_bytes == 0 {
            return Err(ConfigError("board.output_limit_bytes must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn status_policy(&self) -> Result<StatusPolicy, ConfigError> {
        StatusPolicy::new(self.policy.allowed_statuses.iter().cloned())
            .map_err(|err| ConfigError(format!("policy: {err}")))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let secs = self
            .backoff_base_secs
            .saturating_mul(factor)
            .min(self.backoff_max_secs);
        Duration::from_secs(secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig = toml::from_str(&contents)
        .map_err(|err| ConfigError(format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = OrchestratorConfig {
            sprint: Some("Sprint 4".to_string()),
            limits: PlanLimits {
                max_executors: 1,
                ..PlanLimits::default()
            },
            board: BoardConfig {
                command: vec!["gh".to_string(), "project".to_string()],
                ..BoardConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "sprint = \"Sprint 2\"\n\n[limits]\nmax_reviewers = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.sprint.as_deref(), Some("Sprint 2"));
        assert_eq!(cfg.limits.max_reviewers, 5);
        assert_eq!(cfg.limits.max_executors, 2);
        assert_eq!(cfg.policy, PolicyConfig::default());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        for contents in [
            "[limits]\nmax_executors = 0\n",
            "[policy]\nallowed_statuses = []\n",
            "[board]\nsnapshot_path = \"b.json\"\ncommand = [\"gh\"]\n",
            "[board]\ncommand = [\" \"]\n",
            "poll_interval_secs = 0\n",
            "sprint = 3\n",
        ] {
            fs::write(&path, contents).expect("write");
            let err = load_config(&path).expect_err(contents);
            assert!(err.downcast_ref::<ConfigError>().is_some(), "{contents}: {err:#}");
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let cfg = OrchestratorConfig {
            backoff_base_secs: 5,
            backoff_max_secs: 30,
            ..OrchestratorConfig::default()
        };
        let secs: Vec<u64> = (1..=5).map(|n| cfg.backoff(n).as_secs()).collect();
        assert_eq!(secs, vec![5, 10, 20, 30, 30]);
        assert_eq!(cfg.backoff(200).as_secs(), 30);
    }
}
