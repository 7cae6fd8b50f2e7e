//! Reversible timelines and the convergence engine for tempora.
//!
//! A temporal variable keeps every value it has held as an ordered list of
//! slices. Writes are performed under an entropy direction:
//!
//! - **Forward**: ordinary mutation. The operations that produced the value
//!   are logged to the runtime's operation ledger.
//! - **Reverse**: the prior value is reconstructed by applying the inverse
//!   of the most recently logged operations.
//!
//! The convergence engine alternates the two directions until each variable
//! settles into a repeating cycle, then folds that cycle into one slice: the
//! set of all values the variable can validly hold.
//!
//! # Epochs
//!
//! Every slice carries an epoch tag: `0` for the bootstrap, `-1` for writes
//! made outside a run, and `1..N` for the half-cycle of the active run that
//! produced it.
//!
//! # Example
//!
//! ```
//! use tempora_timeline::{Runtime, Superposition};
//!
//! let rt = Runtime::<i64>::new();
//! let x = rt.get_or_create("x", -1);
//! let body_x = x.clone();
//! rt.converge(move |_| {
//!     body_x.commit(body_x.add(1).rem(3)?);
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(x.value(), Superposition::from_values([0, 1, 2]));
//! ```

pub mod convergence;
pub mod entropy;
mod error;
pub mod expr;
pub mod ledger;
pub mod replay;
mod runtime;
pub mod timeline;
mod variable;

pub use convergence::{
    ConvergenceConfig, ConvergenceReport, HalfCycle, LoopOptions, LoopOutcome, run_convergence_loop,
};
pub use entropy::{EntropyController, EntropyState};
pub use error::TemporalError;
pub use expr::{Expr, ExprSource};
pub use ledger::{LedgerEntry, LedgerOp, OperationLedger, WriteOrigin};
pub use replay::ReplayOutcome;
pub use runtime::{DEFAULT_VAR, Runtime};
pub use timeline::Timeline;
pub use variable::{HalfCycleFlags, TemporalVar, VarCell};

pub use tempora_types::{
    BOOTSTRAP_EPOCH, Direction, OUTSIDE_RUN_EPOCH, OrderedFloat, Superposition, TemporalValue, VarId,
};

/// Result type for timeline operations.
pub type Result<T> = std::result::Result<T, TemporalError>;
