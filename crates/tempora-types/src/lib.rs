//! Shared value, identity, and direction types for tempora.
//!
//! This crate is the leaf of the workspace: it has **no internal tempora
//! dependencies**. The timeline engine and the transaction manager both
//! build on it.
//!
//! # Key Types
//!
//! |----------------------|-----------------------------------------------|
//! | Type                 | Purpose                                       |
//! |----------------------|-----------------------------------------------|
//! | [`Superposition`]    | Candidate set stored in one timeline slice    |
//! | [`TemporalValue`]    | Closed arithmetic trait for element types     |
//! | [`Direction`]        | Forward / reverse entropy                     |
//! | [`VarId`]            | Variable identity, also the lock order        |
//! | [`TxId`]             | Transaction identity                          |
//! |----------------------|-----------------------------------------------|

pub mod direction;
pub mod error;
pub mod ids;
pub mod superposition;
pub mod value;

// Re-export primary types at crate root for convenience.
pub use direction::{BOOTSTRAP_EPOCH, Direction, OUTSIDE_RUN_EPOCH};
pub use error::{CollapseError, TypeError};
pub use ids::{TxId, VarId};
pub use superposition::Superposition;
pub use value::{TemporalValue, ValueKind, ordered_f64};

pub use ordered_float::OrderedFloat;
