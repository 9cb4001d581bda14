//! Persisted orchestrator state (`.orchestrator/state/orchestrator_state.json`).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::OrchestratorState;

/// State as loaded, plus the backup path when a corrupt file was moved aside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    pub state: OrchestratorState,
    pub recovered_from: Option<PathBuf>,
}

/// Load state from disk.
///
/// A missing file yields an empty state. A file that is not a JSON object, or
/// that does not decode as orchestrator state, is renamed to
/// `<name>.corrupt-<timestamp>` and replaced by an empty state. Only failures
/// to read or rename are errors.
pub fn load_state(path: &Path, now: DateTime<Utc>) -> Result<LoadedState> {
    debug!(path = %path.display(), "loading orchestrator state");
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no state file, starting empty");
            return Ok(LoadedState {
                state: OrchestratorState::default(),
                recovered_from: None,
            });
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read state {}", path.display()));
        }
    };

    match decode_state(&contents) {
        Ok(state) => {
            debug!(poll_count = state.poll_count, items = state.items.len(), "state loaded");
            Ok(LoadedState {
                state,
                recovered_from: None,
            })
        }
        Err(reason) => {
            let backup = corrupt_backup_path(path, now);
            fs::rename(path, &backup).with_context(|| {
                format!("move corrupt state {} to {}", path.display(), backup.display())
            })?;
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                reason = %reason,
                "state file corrupt, moved aside and reset"
            );
            Ok(LoadedState {
                state: OrchestratorState::default(),
                recovered_from: Some(backup),
            })
        }
    }
}

fn decode_state(contents: &str) -> Result<OrchestratorState, String> {
    let value: Value = serde_json::from_str(contents).map_err(|err| err.to_string())?;
    if !value.is_object() {
        return Err("state root is not a JSON object".to_string());
    }
    serde_json::from_value(value).map_err(|err| err.to_string())
}

/// First unused `<name>.corrupt-<timestamp>[-N]` next to `path`.
fn corrupt_backup_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "orchestrator_state.json".to_string());
    let base = format!("{name}.corrupt-{}", now.format("%Y%m%dT%H%M%SZ"));
    let mut candidate = path.with_file_name(&base);
    let mut suffix = 1u32;
    while candidate.symlink_metadata().is_ok() {
        candidate = path.with_file_name(format!("{base}-{suffix}"));
        suffix += 1;
    }
    candidate
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &OrchestratorState) -> Result<()> {
    debug!(path = %path.display(), poll_count = state.poll_count, "writing orchestrator state");
    super::write_json_atomic(path, state)
}
