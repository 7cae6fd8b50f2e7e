//! A single optimistic transaction: read set, buffered writes, and hooks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tempora_timeline::{Superposition, TemporalValue, TemporalVar, VarId};
use tempora_types::TxId;

use crate::Result;
use crate::cell::{Staged, StagedWrite, TxCell};
use crate::error::TxError;

pub(crate) struct ReadEntry {
    pub(crate) cell: Arc<dyn TxCell>,
    pub(crate) version: u64,
}

pub(crate) type CommitHook = Box<dyn FnOnce() + Send>;

/// Buffered reads and writes, applied atomically on commit.
pub struct Transaction {
    id: TxId,
    pub(crate) reads: BTreeMap<VarId, ReadEntry>,
    pub(crate) writes: BTreeMap<VarId, Box<dyn StagedWrite>>,
    pub(crate) hooks: Vec<CommitHook>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("reads", &self.reads.keys().collect::<Vec<_>>())
            .field("writes", &self.writes.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: TxId::next(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            hooks: Vec::new(),
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    /// Read a variable.
    ///
    /// Returns this transaction's own staged value if it wrote `var`.
    /// Otherwise records the version on first read; a later read that finds
    /// the version moved fails early with [`TxError::Conflict`].
    pub fn read<T: TemporalValue>(&mut self, var: &TemporalVar<T>) -> Result<Superposition<T>> {
        if let Some(staged) = self.writes.get(&var.id()) {
            if let Some(staged) = staged.as_any().downcast_ref::<Staged<T>>() {
                return Ok(staged.value.clone());
            }
        }

        let (value, version) = var.read_versioned();
        match self.reads.get(&var.id()) {
            Some(entry) if entry.version != version => Err(TxError::Conflict {
                var: var.id(),
                name: var.name().to_string(),
            }),
            Some(_) => Ok(value),
            None => {
                self.reads.insert(
                    var.id(),
                    ReadEntry {
                        cell: Arc::new(var.clone()),
                        version,
                    },
                );
                Ok(value)
            }
        }
    }

    /// Buffer a write. Later writes to the same variable replace earlier ones.
    pub fn write<T: TemporalValue>(&mut self, var: &TemporalVar<T>, value: impl Into<Superposition<T>>) {
        self.writes.insert(
            var.id(),
            Box::new(Staged {
                var: var.clone(),
                value: value.into(),
            }),
        );
    }

    /// Run `hook` after a successful commit, in registration order.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn read_set_len(&self) -> usize {
        self.reads.len()
    }

    pub fn write_set_len(&self) -> usize {
        self.writes.len()
    }

    /// Every variable the commit must lock, in ascending `VarId` order.
    pub(crate) fn lock_set(&self) -> Vec<Arc<dyn TxCell>> {
        let mut cells: BTreeMap<VarId, Arc<dyn TxCell>> = self
            .reads
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.cell)))
            .collect();
        for (id, staged) in &self.writes {
            cells.entry(*id).or_insert_with(|| staged.cell());
        }
        cells.into_values().collect()
    }

    /// First read whose variable has moved since it was read.
    pub(crate) fn first_conflict(&self) -> Option<TxError> {
        self.reads
            .values()
            .find(|entry| entry.cell.cell_version() != entry.version)
            .map(|entry| TxError::Conflict {
                var: entry.cell.cell_id(),
                name: entry.cell.cell_name().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempora_timeline::Runtime;

    #[test]
    fn test_read_your_writes() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 1);
        let mut tx = Transaction::new();
        tx.write(&a, 5);
        assert_eq!(tx.read(&a).unwrap(), Superposition::scalar(5));
        assert_eq!(a.value(), Superposition::scalar(1));
        assert_eq!(tx.read_set_len(), 0);
    }

    #[test]
    fn test_repeat_read_detects_change() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 1);
        let mut tx = Transaction::new();
        tx.read(&a).unwrap();
        a.assign(2);
        assert!(matches!(tx.read(&a), Err(TxError::Conflict { .. })));
        assert!(tx.first_conflict().is_some());
    }

    #[test]
    fn test_lock_set_is_sorted_and_deduplicated() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let b = rt.get_or_create("b", 0);
        let mut tx = Transaction::new();
        tx.write(&b, 1);
        tx.read(&b).unwrap();
        tx.read(&a).unwrap();
        let ids: Vec<_> = tx.lock_set().iter().map(|c| c.cell_id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
        assert!(!tx.is_read_only());
    }

    #[test]
    fn test_mixed_element_types() {
        let ints = Runtime::<i64>::new();
        let bytes = Runtime::<u8>::new();
        let a = ints.get_or_create("a", 1);
        let b = bytes.get_or_create("b", 2u8);
        let mut tx = Transaction::new();
        tx.write(&a, 3);
        tx.write(&b, 4u8);
        assert_eq!(tx.read(&b).unwrap(), Superposition::scalar(4u8));
        assert_eq!(tx.write_set_len(), 2);
    }
}
