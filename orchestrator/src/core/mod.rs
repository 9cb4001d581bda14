//! Deterministic, pure logic for the orchestrator control loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! board snapshots and orchestrator state and return deterministic outputs
//! suitable for tests. Persistence, board access and emission live in
//! [`crate::io`].

pub mod error;
pub mod ownership;
pub mod path;
pub mod policy;
pub mod reconcile;
pub mod refs;
pub mod run_ids;
pub mod run_plan;
pub mod sanitizer;
pub mod types;
