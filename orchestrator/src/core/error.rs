//! Error taxonomy for the planning core.

use thiserror::Error;

/// Failure raised by the run plan builder before any state is advanced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Bad parameters or policy (fatal, not retried).
    #[error("invalid plan input: {0}")]
    Validation(String),
    /// A board item violates the item contract. The whole cycle is rejected.
    #[error("malformed item data: {0}")]
    MalformedItem(String),
}
