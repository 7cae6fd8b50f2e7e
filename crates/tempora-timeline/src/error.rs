//! Error types for timeline and convergence operations.

use tempora_types::{CollapseError, TypeError};
use thiserror::Error;

/// Errors that can occur while writing temporal variables or running a
/// convergence loop.
#[derive(Error, Debug)]
pub enum TemporalError {
    /// Operator not supported by the element type (bitwise on fractional).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(#[from] TypeError),

    /// Division or modulus with a zero candidate in the divisor.
    #[error("division by zero in `{op}`")]
    DivisionByZero { op: &'static str },

    /// Collapse of a superposition failed.
    #[error(transparent)]
    Collapse(#[from] CollapseError),

    /// Entropy must be strictly positive or strictly negative.
    #[error("entropy direction must be nonzero")]
    ZeroEntropy,

    /// A convergence run is already active on this runtime.
    #[error("a convergence run is already active on this runtime")]
    RunInProgress,

    /// The loop hit its half-cycle bound before every variable settled.
    #[error("no convergence after {half_cycles} half-cycles (unsettled: {unsettled:?})")]
    NoConvergence {
        half_cycles: usize,
        unsettled: Vec<String>,
    },

    /// Failure raised by caller-supplied loop code.
    #[error("{0}")]
    Body(String),
}

impl TemporalError {
    /// Wrap an arbitrary message as a loop-body failure.
    pub fn body(message: impl Into<String>) -> Self {
        TemporalError::Body(message.into())
    }
}
