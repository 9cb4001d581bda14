//! Multi-cycle driver for `orchestrator run`.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::run_ids::RunIdGenerator;
use crate::cycle::{CycleOptions, CycleOutcome, run_cycle};
use crate::io::board::{BoardSource, TransientBoardError};
use crate::io::config::load_config;
use crate::io::emit::Emitter;
use crate::io::init::OrchestratorPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run exactly one cycle.
    Once,
    /// Keep polling until the sprint completes.
    Loop,
}

#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub mode: RunMode,
    /// Stop after this many successful cycles.
    pub max_cycles: Option<u32>,
    pub cycle: CycleOptions,
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// No in-scope item is active any more.
    Completed,
    /// Run mode `once` finished its single cycle.
    Once,
    MaxCycles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub cycles: u32,
    pub stop: LoopStop,
    pub last: CycleOutcome,
}

/// Transient board failures outlasted the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transient failure persisted after {attempts} attempt(s): {last_error}")]
pub struct TransientRetriesExhausted {
    pub attempts: u32,
    pub last_error: String,
}

/// Run cycles until the sprint completes, the mode says stop, or `max_cycles` is hit.
///
/// Transient board errors are retried after `sleep(backoff)`; anything else
/// (malformed data, validation, I/O) stops the loop immediately. `sleep` is
/// injected so tests can run without waiting.
pub fn run_loop<B, E, G, S, F>(
    root: &Path,
    board: &B,
    emitter: &mut E,
    ids: &mut G,
    options: &LoopOptions,
    mut sleep: S,
    mut on_cycle: F,
) -> Result<LoopOutcome>
where
    B: BoardSource + ?Sized,
    E: Emitter + ?Sized,
    G: RunIdGenerator + ?Sized,
    S: FnMut(Duration),
    F: FnMut(&CycleOutcome),
{
    let paths = OrchestratorPaths::new(root);
    let config = load_config(&paths.config_path)?;

    let mut cycles = 0u32;
    let mut failures = 0u32;
    loop {
        let outcome = match run_cycle(root, board, emitter, ids, &options.cycle) {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.downcast_ref::<TransientBoardError>().is_none() {
                    return Err(err);
                }
                failures += 1;
                if options.mode == RunMode::Once || failures > config.transient_retry_limit {
                    return Err(TransientRetriesExhausted {
                        attempts: failures,
                        last_error: format!("{err:#}"),
                    }
                    .into());
                }
                let delay = config.backoff(failures);
                warn!(
                    attempt = failures,
                    delay_secs = delay.as_secs(),
                    err = %format!("{err:#}"),
                    "transient board failure, retrying"
                );
                sleep(delay);
                continue;
            }
        };

        failures = 0;
        cycles += 1;
        on_cycle(&outcome);

        let stop = if outcome.completed {
            Some(LoopStop::Completed)
        } else if options.mode == RunMode::Once {
            Some(LoopStop::Once)
        } else if options.max_cycles.is_some_and(|max| cycles >= max) {
            Some(LoopStop::MaxCycles)
        } else {
            None
        };
        if let Some(stop) = stop {
            info!(cycles, ?stop, "loop finished");
            return Ok(LoopOutcome {
                cycles,
                stop,
                last: outcome,
            });
        }
        sleep(config.poll_interval());
    }
}
