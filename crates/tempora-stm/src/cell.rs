//! Type-erased view of a temporal variable for the commit protocol.
//!
//! One transaction may touch variables of several element types. The
//! manager only needs identity, version, and the commit gate, so it works
//! against [`TxCell`] trait objects; staged values keep their concrete type
//! behind [`StagedWrite`].

use std::any::Any;
use std::sync::Arc;

use parking_lot::MutexGuard;
use tempora_timeline::{Superposition, TemporalValue, TemporalVar, VarId};

/// What the commit protocol needs from a variable.
pub trait TxCell: Send + Sync {
    fn cell_id(&self) -> VarId;
    fn cell_name(&self) -> &str;
    fn cell_version(&self) -> u64;
    /// Take the per-variable commit gate.
    fn lock_gate(&self) -> MutexGuard<'_, ()>;
}

impl<T: TemporalValue> TxCell for TemporalVar<T> {
    fn cell_id(&self) -> VarId {
        self.id()
    }

    fn cell_name(&self) -> &str {
        self.name()
    }

    fn cell_version(&self) -> u64 {
        self.version()
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate()
    }
}

/// A buffered write, applied only after validation succeeds.
pub(crate) trait StagedWrite: Send {
    fn cell(&self) -> Arc<dyn TxCell>;
    /// Install the value. Caller holds the variable's gate.
    fn apply(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct Staged<T: TemporalValue> {
    pub(crate) var: TemporalVar<T>,
    pub(crate) value: Superposition<T>,
}

impl<T: TemporalValue> StagedWrite for Staged<T> {
    fn cell(&self) -> Arc<dyn TxCell> {
        Arc::new(self.var.clone())
    }

    fn apply(&self) -> u64 {
        self.var.apply_committed(self.value.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
