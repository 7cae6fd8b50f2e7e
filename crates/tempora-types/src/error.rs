//! Error types for values and superpositions.

use thiserror::Error;

/// Element type errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Bitwise operator applied to a non-integral element type.
    #[error("operator `{op}` requires an integral element type, got {type_name}")]
    NotIntegral {
        op: &'static str,
        type_name: &'static str,
    },

    /// Element type cannot be totally ordered.
    ///
    /// The `TemporalValue: Ord` bound rejects these at compile time; this
    /// variant covers values validated at runtime (e.g. NaN fed through a
    /// config file).
    #[error("element type {type_name} does not support ordering comparisons")]
    Unordered { type_name: &'static str },
}

/// Errors raised when collapsing a superposition to a single value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollapseError {
    /// No candidates to choose from.
    #[error("cannot observe an empty superposition")]
    Empty,

    /// Every candidate has zero weight.
    #[error("cannot observe a superposition whose weights are all zero")]
    ZeroWeight,
}
