//! Multi-agent orchestrator CLI.
//!
//! Polls a sprint board and emits `RUN_INTENT` records for agent supervisors.
//! State lives in `.orchestrator/state/orchestrator_state.json` under the
//! project root.

use std::path::PathBuf;
use std::thread;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use orchestrator::core::run_ids::RandomRunIds;
use orchestrator::cycle::{CycleOptions, resolve_sprint};
use orchestrator::exit_codes;
use orchestrator::io::board::board_from_config;
use orchestrator::io::config::load_config;
use orchestrator::io::emit::JsonLinesEmitter;
use orchestrator::io::init::{InitOptions, OrchestratorPaths, init_orchestrator};
use orchestrator::logging;
use orchestrator::looping::{LoopOptions, RunMode, run_loop};
use orchestrator::seal::seal_sprint;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Board-driven dispatch loop for executor and reviewer agents"
)]
struct Cli {
    /// Project root containing `.orchestrator/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.orchestrator/` with a default config and empty state.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Freeze ownership and dependency metadata for a sprint.
    Seal {
        /// Sprint to seal (defaults to the configured sprint).
        #[arg(long)]
        sprint: Option<String>,
        /// Replace an existing plan for the same sprint.
        #[arg(long)]
        reseal: bool,
        /// Fixed RFC 3339 clock, for reproducible runs.
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },
    /// Poll the board and dispatch agents.
    Run {
        /// Sprint to plan for (defaults to the configured sprint).
        #[arg(long)]
        sprint: Option<String>,
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
        /// Stop after this many successful cycles.
        #[arg(long)]
        max_cycles: Option<u32>,
        /// Fixed RFC 3339 clock, for reproducible runs.
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { force } => {
            let paths = init_orchestrator(&cli.root, &InitOptions { force })?;
            info!(dir = %paths.orchestrator_dir.display(), "initialized");
            Ok(())
        }
        Command::Seal {
            sprint,
            reseal,
            now,
        } => {
            let paths = OrchestratorPaths::new(&cli.root);
            let config = load_config(&paths.config_path)?;
            let sprint = resolve_sprint(
                &CycleOptions {
                    sprint,
                    now: None,
                },
                &config,
            )?;
            let board = board_from_config(&cli.root, &config.board);
            let outcome = seal_sprint(
                &cli.root,
                &*board,
                &sprint,
                reseal,
                now.unwrap_or_else(Utc::now),
            )?;
            println!(
                "sealed {}: {} issue(s), {} chained, {} dropped edge(s)",
                outcome.sprint,
                outcome.issues,
                outcome.chained,
                outcome.dropped_edges.len()
            );
            Ok(())
        }
        Command::Run {
            sprint,
            once,
            max_cycles,
            now,
        } => {
            let paths = OrchestratorPaths::new(&cli.root);
            let config = load_config(&paths.config_path)?;
            let board = board_from_config(&cli.root, &config.board);
            let mut emitter = JsonLinesEmitter::stdio();
            let mut ids = RandomRunIds;
            let options = LoopOptions {
                mode: if once { RunMode::Once } else { RunMode::Loop },
                max_cycles,
                cycle: CycleOptions { sprint, now },
            };
            let outcome = run_loop(
                &cli.root,
                &*board,
                &mut emitter,
                &mut ids,
                &options,
                thread::sleep,
                |cycle| {
                    info!(
                        poll_count = cycle.poll_count,
                        intents = cycle.intents,
                        "cycle finished"
                    );
                },
            )?;
            info!(cycles = outcome.cycles, stop = ?outcome.stop, "run finished");
            Ok(())
        }
    }
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| format!("invalid RFC 3339 timestamp '{raw}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["orchestrator", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_once_with_overrides() {
        let cli = Cli::parse_from([
            "orchestrator",
            "run",
            "--once",
            "--sprint",
            "Sprint 4",
            "--now",
            "2026-03-02T09:00:00Z",
            "--root",
            "/srv/project",
        ]);
        assert_eq!(cli.root, PathBuf::from("/srv/project"));
        match cli.command {
            Command::Run {
                sprint,
                once,
                max_cycles,
                now,
            } => {
                assert!(once);
                assert_eq!(sprint.as_deref(), Some("Sprint 4"));
                assert_eq!(max_cycles, None);
                assert_eq!(
                    now.map(|dt| dt.to_rfc3339()),
                    Some("2026-03-02T09:00:00+00:00".to_string())
                );
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_seal_reseal() {
        let cli = Cli::parse_from(["orchestrator", "seal", "--reseal"]);
        assert!(matches!(
            cli.command,
            Command::Seal {
                reseal: true,
                sprint: None,
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_clock() {
        assert!(Cli::try_parse_from(["orchestrator", "run", "--now", "yesterday"]).is_err());
    }
}
