//! Control loop for a multi-agent software delivery orchestrator.
//!
//! Each poll reads a sprint board, decides which executor or reviewer agents
//! to dispatch, and persists per-item state so later polls never re-dispatch
//! the same work. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (run planning, ownership,
//!   dependency sanitation, state reconciliation). No I/O.
//! - **[`io`]**: Side-effecting operations (config, state file, board reads,
//!   record emission).
//!
//! Orchestration modules ([`cycle`], [`looping`], [`seal`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod seal;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
