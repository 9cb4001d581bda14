//! Stable exit codes for orchestrator CLI commands.

use crate::core::error::PlanError;
use crate::io::board::{MalformedItemData, TransientBoardError};
use crate::io::config::ConfigError;
use crate::io::process::SpawnError;
use crate::looping::TransientRetriesExhausted;
use crate::seal::{AlreadySealed, DependencyCycleError};

/// Command succeeded.
pub const OK: i32 = 0;
/// Unexpected failure (I/O, emit, internal errors).
pub const FAILURE: i32 = 1;
/// Invalid config, policy or parameters; a rejected seal; an unrunnable board command.
pub const INVALID: i32 = 2;
/// Board data violated the item contract.
pub const MALFORMED_DATA: i32 = 3;
/// Transient board failures outlasted the retry budget.
pub const TRANSIENT_EXHAUSTED: i32 = 4;

/// Map an error chain to the exit code a supervisor should see.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(plan) = err.downcast_ref::<PlanError>() {
        return match plan {
            PlanError::Validation(_) => INVALID,
            PlanError::MalformedItem(_) => MALFORMED_DATA,
        };
    }
    if err.downcast_ref::<MalformedItemData>().is_some() {
        return MALFORMED_DATA;
    }
    if err.downcast_ref::<TransientRetriesExhausted>().is_some()
        || err.downcast_ref::<TransientBoardError>().is_some()
    {
        return TRANSIENT_EXHAUSTED;
    }
    if err.downcast_ref::<ConfigError>().is_some()
        || err.downcast_ref::<DependencyCycleError>().is_some()
        || err.downcast_ref::<AlreadySealed>().is_some()
        || err.downcast_ref::<SpawnError>().is_some()
    {
        return INVALID;
    }
    FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    use crate::core::sanitizer::CycleError;

    #[test]
    fn typed_errors_map_through_context() {
        let malformed: anyhow::Error = PlanError::MalformedItem("bad".to_string()).into();
        assert_eq!(for_error(&malformed.context("plan cycle")), MALFORMED_DATA);

        let transient = Err::<(), _>(TransientBoardError("reset".to_string()))
            .context("fetch board")
            .expect_err("error");
        assert_eq!(for_error(&transient), TRANSIENT_EXHAUSTED);

        let cycle: anyhow::Error = DependencyCycleError(CycleError {
            cycles: vec![vec![1, 2]],
        })
        .into();
        assert_eq!(for_error(&cycle), INVALID);
        assert_eq!(
            for_error(&ConfigError("limits".to_string()).into()),
            INVALID
        );
    }

    #[test]
    fn untyped_errors_are_failures() {
        assert_eq!(for_error(&anyhow!("disk full")), FAILURE);
    }
}
