//! Error types for transactions.

use tempora_timeline::{TemporalError, VarId};
use tempora_types::CollapseError;
use thiserror::Error;

/// Errors that can occur while running or committing a transaction.
#[derive(Error, Debug)]
pub enum TxError {
    /// A variable read by the transaction changed before it committed.
    #[error("conflict on {name} ({var})")]
    Conflict { var: VarId, name: String },

    /// Retry attempts exhausted.
    #[error("transaction aborted after {attempts} attempts")]
    Aborted { attempts: u32 },

    /// The transaction was rolled back explicitly.
    #[error("transaction rolled back")]
    RolledBack,

    /// No ambient transaction on this thread or task.
    #[error("no ambient transaction in scope")]
    NoAmbientTransaction,

    /// Locks were about to be taken out of `VarId` order.
    #[error("lock order violation: {prev} acquired before {next}")]
    LockOrderViolation { prev: VarId, next: VarId },

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    #[error(transparent)]
    Collapse(#[from] CollapseError),

    /// Failure raised by the transaction body.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TxError {
    /// Whether running the body again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxError::Conflict { .. })
    }
}
