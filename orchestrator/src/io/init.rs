//! Initialization helpers for `.orchestrator/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{OrchestratorConfig, write_config};
use super::state_store::write_state;
use crate::core::types::OrchestratorState;

/// All canonical paths within `.orchestrator/` for a project root.
#[derive(Debug, Clone)]
pub struct OrchestratorPaths {
    pub root: PathBuf,
    pub orchestrator_dir: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
}

impl OrchestratorPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let orchestrator_dir = root.join(".orchestrator");
        let state_dir = orchestrator_dir.join("state");
        Self {
            root: root.clone(),
            orchestrator_dir: orchestrator_dir.clone(),
            state_dir: state_dir.clone(),
            gitignore_path: orchestrator_dir.join(".gitignore"),
            config_path: orchestrator_dir.join("config.toml"),
            state_path: state_dir.join("orchestrator_state.json"),
        }
    }
}

/// Options for `init_orchestrator`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing orchestrator-owned files.
    pub force: bool,
}

/// Create `.orchestrator/` scaffolding in `root`: default config and an empty state.
///
/// Fails if `.orchestrator/` already exists unless `options.force` is set.
pub fn init_orchestrator(root: &Path, options: &InitOptions) -> Result<OrchestratorPaths> {
    let paths = OrchestratorPaths::new(root);
    if paths.orchestrator_dir.exists() && !paths.orchestrator_dir.is_dir() {
        return Err(anyhow!(
            "orchestrator init: .orchestrator exists but is not a directory"
        ));
    }
    if paths.orchestrator_dir.exists() && !options.force {
        return Err(anyhow!(
            "orchestrator init: .orchestrator already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create directory {}", paths.state_dir.display()))?;
    fs::write(&paths.gitignore_path, ORCHESTRATOR_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &OrchestratorConfig::default())?;
    write_state(&paths.state_path, &OrchestratorState::default())?;

    Ok(paths)
}

const ORCHESTRATOR_GITIGNORE: &str = "state/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;
    use crate::io::state_store::load_state;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_orchestrator(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.state_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            ORCHESTRATOR_GITIGNORE
        );
        assert_eq!(
            load_config(&paths.config_path).expect("config"),
            OrchestratorConfig::default()
        );
        assert_eq!(
            fs::read_to_string(&paths.state_path).expect("read"),
            "{\n  \"poll_count\": 0,\n  \"items\": {},\n  \"sprint_plan\": null,\n  \"ownership_index\": null,\n  \"end_of_sprint_reported\": null\n}\n"
        );
        let loaded = load_state(&paths.state_path, chrono::Utc::now()).expect("state");
        assert_eq!(loaded.state, OrchestratorState::default());
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_orchestrator(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_orchestrator(temp.path(), &InitOptions { force: false })
            .expect_err("second init");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_resets_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_orchestrator(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.state_path, "{\"poll_count\": 9}").expect("write");

        init_orchestrator(temp.path(), &InitOptions { force: true }).expect("re-init");
        let loaded = load_state(&paths.state_path, chrono::Utc::now()).expect("state");
        assert_eq!(loaded.state.poll_count, 0);
    }
}
