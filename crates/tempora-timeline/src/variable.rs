//! Temporal variables.
//!
//! A [`TemporalVar`] is a cheap handle onto a registry-owned [`VarCell`].
//! Writes go through [`TemporalVar::commit`], which decides per write
//! whether to append, replace, or union into the timeline, and on reverse
//! writes reconstructs the prior slice from the ledger.
//!
//! Lock discipline: the ledger mutex and a variable's state lock are never
//! held at the same time. Expressions capture their source's slice when
//! they are built, so committing never locks a second variable.

use std::collections::BTreeSet;
use std::fmt;
use std::ops;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tempora_types::{Direction, OUTSIDE_RUN_EPOCH, Superposition, TemporalValue, VarId};
use tracing::{debug, trace, warn};

use crate::Result;
use crate::entropy::EntropyState;
use crate::expr::{Expr, ExprSource};
use crate::ledger::{LedgerOp, WriteOrigin};
use crate::replay::{self, ReplayOutcome};
use crate::runtime::RuntimeShared;
use crate::timeline::Timeline;

/// Flags reset by the convergence engine at the start of every half-cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HalfCycleFlags {
    /// A slice was appended after the bootstrap during this half-cycle.
    pub bootstrap_superseded: bool,
    pub saw_forward_write: bool,
    pub saw_reverse_write: bool,
}

#[derive(Debug)]
pub(crate) struct VarState<T: Ord> {
    pub(crate) timeline: Timeline<T>,
    pub(crate) domain: BTreeSet<T>,
    pub(crate) flags: HalfCycleFlags,
    pub(crate) version: u64,
    /// Writes received since the current run started.
    pub(crate) run_writes: usize,
}

impl<T: TemporalValue> VarState<T> {
    fn new(seed: Superposition<T>) -> Self {
        let domain = seed.iter().copied().collect();
        Self {
            timeline: Timeline::new(seed),
            domain,
            flags: HalfCycleFlags::default(),
            version: 0,
            run_writes: 0,
        }
    }

    fn observe(&mut self, value: &Superposition<T>) {
        self.domain.extend(value.iter().copied());
        self.version += 1;
    }

    /// Rebuild the domain from the current slice only.
    pub(crate) fn reseed_domain(&mut self) {
        self.domain = self.timeline.last().iter().copied().collect();
    }

    fn current(&self, entropy: &EntropyState) -> &Superposition<T> {
        if entropy.in_run {
            self.timeline.current_for_epoch(entropy.epoch)
        } else {
            self.timeline.last()
        }
    }
}

/// Registry-owned storage for one variable.
pub struct VarCell<T: Ord> {
    id: VarId,
    name: String,
    pub(crate) state: RwLock<VarState<T>>,
    /// Held by the transaction manager while committing to this variable.
    gate: Mutex<()>,
}

impl<T: TemporalValue> VarCell<T> {
    pub(crate) fn new(name: impl Into<String>, seed: Superposition<T>) -> Self {
        Self {
            id: VarId::next(),
            name: name.into(),
            state: RwLock::new(VarState::new(seed)),
            gate: Mutex::new(()),
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Ord> fmt::Debug for VarCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarCell")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// How a write lands on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    Append,
    Replace,
    Union,
    Quarantine,
}

/// Handle to a temporal variable.
pub struct TemporalVar<T: TemporalValue> {
    pub(crate) cell: Arc<VarCell<T>>,
    pub(crate) rt: Arc<RuntimeShared<T>>,
}

impl<T: TemporalValue> Clone for TemporalVar<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            rt: Arc::clone(&self.rt),
        }
    }
}

impl<T: TemporalValue> fmt::Debug for TemporalVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporalVar")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .field("value", &self.value())
            .finish()
    }
}

impl<T: TemporalValue> fmt::Display for TemporalVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl<T: TemporalValue> TemporalVar<T> {
    pub(crate) fn new(cell: Arc<VarCell<T>>, rt: Arc<RuntimeShared<T>>) -> Self {
        Self { cell, rt }
    }

    pub fn id(&self) -> VarId {
        self.cell.id
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Current slice.
    ///
    /// Outside a run this is the newest slice. Inside a run it is the newest
    /// slice tagged with the active epoch, falling back to the newest slice
    /// when this half-cycle has not written yet.
    pub fn value(&self) -> Superposition<T> {
        let entropy = self.rt.entropy.snapshot();
        self.cell.state.read().current(&entropy).clone()
    }

    /// Newest slice, ignoring epochs.
    pub fn last(&self) -> Superposition<T> {
        self.cell.state.read().timeline.last().clone()
    }

    /// Collapse the current slice to one value.
    pub fn observe(&self) -> Result<T> {
        Ok(self.value().observe()?)
    }

    /// Start an expression from this variable's current slice.
    pub fn expr(&self) -> Expr<T> {
        Expr::from_var(self.cell.id, self.value())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, rhs: impl Into<Superposition<T>>) -> Expr<T> {
        self.expr().add(rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(&self, rhs: impl Into<Superposition<T>>) -> Expr<T> {
        self.expr().sub(rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(&self, rhs: impl Into<Superposition<T>>) -> Expr<T> {
        self.expr().mul(rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(&self, rhs: impl Into<Superposition<T>>) -> Result<Expr<T>> {
        self.expr().div(rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn rem(&self, rhs: impl Into<Superposition<T>>) -> Result<Expr<T>> {
        self.expr().rem(rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(&self) -> Expr<T> {
        self.expr().neg()
    }

    /// Write a constant.
    pub fn assign(&self, value: impl Into<Superposition<T>>) {
        self.commit(Expr::constant(value));
    }

    /// Write another variable's current value (`self = other`).
    pub fn assign_from(&self, other: &TemporalVar<T>) {
        self.commit(other.expr());
    }

    /// Commit an expression under the runtime's current direction.
    pub fn commit(&self, expr: Expr<T>) {
        let entropy = self.rt.entropy.snapshot();
        let origin = WriteOrigin::classify(expr.source_id(), self.cell.id);
        let (incoming, source, ops) = expr.into_parts();

        match entropy.direction {
            Direction::Forward => self.commit_forward(&entropy, origin, incoming, ops),
            Direction::Reverse => self.commit_reverse(&entropy, origin, incoming, source),
        }
    }

    fn commit_forward(
        &self,
        entropy: &EntropyState,
        origin: WriteOrigin,
        incoming: Superposition<T>,
        ops: Vec<LedgerOp<T>>,
    ) {
        let epoch = entropy.active_epoch();
        {
            let mut state = self.cell.state.write();
            let placement = if entropy.in_run {
                if !state.flags.saw_forward_write {
                    Placement::Append
                } else if origin == WriteOrigin::SelfFeedback {
                    Placement::Union
                } else {
                    Placement::Replace
                }
            } else if state.timeline.len() > 1 && state.timeline.last_epoch() == OUTSIDE_RUN_EPOCH {
                Placement::Union
            } else {
                Placement::Append
            };

            state.flags.saw_forward_write = true;
            self.place(&mut state, placement, incoming, epoch, entropy.in_run);
        }

        let seq = self.rt.ledger.lock().record(self.cell.id, epoch, origin, ops);
        trace!(var = %self.cell.name, seq, epoch, "logged forward commit");
    }

    fn commit_reverse(
        &self,
        entropy: &EntropyState,
        origin: WriteOrigin,
        incoming: Superposition<T>,
        source: Option<ExprSource<T>>,
    ) {
        let epoch = entropy.active_epoch();
        let popped = self.rt.ledger.lock().take_latest(self.cell.id);

        let mut state = self.cell.state.write();
        let reconstructed = match (origin, source) {
            (WriteOrigin::CrossVariable(src), Some(source)) => {
                if let Some(entry) = popped {
                    debug!(var = %self.cell.name, seq = entry.seq, %src, "skipping ledger entry for cross-variable write");
                }
                let baseline = if entropy.in_run {
                    state.timeline.baseline_before(epoch)
                } else {
                    state.timeline.last()
                };
                replay::reconstruct_cross_variable(&incoming, &source.snapshot, baseline)
            }
            _ => {
                let ops = popped.map(|e| e.ops).unwrap_or_default();
                let current = state.current(entropy).clone();
                match replay::replay(&current, &ops) {
                    ReplayOutcome::Exact(prior) => prior,
                    ReplayOutcome::Empty => incoming,
                    ReplayOutcome::Approximate { op } => {
                        warn!(var = %self.cell.name, op, "operation not invertible, keeping forward value");
                        incoming
                    }
                }
            }
        };

        let placement = if !entropy.in_run {
            Placement::Quarantine
        } else if state.flags.saw_reverse_write {
            Placement::Replace
        } else {
            Placement::Append
        };
        state.flags.saw_reverse_write = true;
        self.place(&mut state, placement, reconstructed, epoch, entropy.in_run);
    }

    fn place(
        &self,
        state: &mut VarState<T>,
        placement: Placement,
        value: Superposition<T>,
        epoch: i64,
        in_run: bool,
    ) {
        state.observe(&value);
        let before = state.timeline.len();
        match placement {
            Placement::Append => state.timeline.snapshot_append(value, epoch),
            Placement::Replace => state.timeline.replace_last(value, epoch),
            Placement::Union => state.timeline.union_last(&value, epoch),
            Placement::Quarantine => state.timeline.quarantine(value),
        }
        if in_run {
            state.run_writes += 1;
            if state.timeline.len() > before {
                state.flags.bootstrap_superseded = true;
            }
        }
        trace!(
            var = %self.cell.name,
            ?placement,
            epoch,
            len = state.timeline.len(),
            "placed write"
        );
    }

    /// Fold the newest `count` slices into one.
    pub fn unify(&self, count: usize) {
        let mut state = self.cell.state.write();
        state.timeline.unify_last(count);
        state.version += 1;
    }

    /// Fold all post-bootstrap history into one slice.
    pub fn unify_all(&self) {
        let mut state = self.cell.state.write();
        state.timeline.unify_all();
        state.version += 1;
    }

    /// Fold a short cycle ending at the newest slice, if one exists within
    /// the configured window. Returns the cycle length.
    pub fn fold_cycle(&self) -> Option<usize> {
        self.fold_cycle_within(self.rt.config.cycle_window)
    }

    pub fn fold_cycle_within(&self, window: usize) -> Option<usize> {
        let mut state = self.cell.state.write();
        let folded = state.timeline.fold_recent_cycle(window);
        if folded.is_some() {
            state.version += 1;
        }
        folded
    }

    pub fn converged(&self) -> usize {
        self.cell.state.read().timeline.converged()
    }

    /// Replace the bootstrap slice and discard all derived history.
    pub fn reseed(&self, value: impl Into<Superposition<T>>) {
        let value = value.into();
        let mut state = self.cell.state.write();
        state.timeline.reseed(value);
        state.reseed_domain();
        state.version += 1;
    }

    /// Every value this variable has held since its domain was last reseeded.
    pub fn domain(&self) -> Vec<T> {
        self.cell.state.read().domain.iter().copied().collect()
    }

    pub fn timeline_len(&self) -> usize {
        self.cell.state.read().timeline.len()
    }

    pub fn epochs(&self) -> Vec<i64> {
        self.cell.state.read().timeline.epochs().to_vec()
    }

    pub fn slices(&self) -> Vec<Superposition<T>> {
        self.cell.state.read().timeline.slices().to_vec()
    }

    pub fn flags(&self) -> HalfCycleFlags {
        self.cell.state.read().flags
    }

    /// Monotonic count of mutations.
    pub fn version(&self) -> u64 {
        self.cell.state.read().version
    }

    /// Current slice and version, read under one lock.
    pub fn read_versioned(&self) -> (Superposition<T>, u64) {
        let entropy = self.rt.entropy.snapshot();
        let state = self.cell.state.read();
        (state.current(&entropy).clone(), state.version)
    }

    /// Install a transactionally committed value.
    ///
    /// Always appends, tagged with the active epoch, and bypasses the
    /// ledger. Callers hold [`write_gate`](Self::write_gate).
    pub fn apply_committed(&self, value: Superposition<T>) -> u64 {
        let epoch = self.rt.entropy.active_epoch();
        let mut state = self.cell.state.write();
        state.observe(&value);
        state.timeline.snapshot_append(value, epoch);
        state.version
    }

    /// Per-variable commit lock used by the transaction manager.
    pub fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.cell.gate.lock()
    }
}

impl<T: TemporalValue, R: Into<Superposition<T>>> ops::Add<R> for &TemporalVar<T> {
    type Output = Expr<T>;

    fn add(self, rhs: R) -> Expr<T> {
        TemporalVar::add(self, rhs)
    }
}

impl<T: TemporalValue, R: Into<Superposition<T>>> ops::Sub<R> for &TemporalVar<T> {
    type Output = Expr<T>;

    fn sub(self, rhs: R) -> Expr<T> {
        TemporalVar::sub(self, rhs)
    }
}

impl<T: TemporalValue, R: Into<Superposition<T>>> ops::Mul<R> for &TemporalVar<T> {
    type Output = Expr<T>;

    fn mul(self, rhs: R) -> Expr<T> {
        TemporalVar::mul(self, rhs)
    }
}

impl<T: TemporalValue> ops::Neg for &TemporalVar<T> {
    type Output = Expr<T>;

    fn neg(self) -> Expr<T> {
        TemporalVar::neg(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn s(values: &[i64]) -> Superposition<i64> {
        Superposition::from_values(values.iter().copied())
    }

    #[test]
    fn test_outside_run_forward_appends_then_unions() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 0);
        x.assign(5);
        assert_eq!(x.slices(), vec![s(&[0]), s(&[5])]);
        assert_eq!(x.epochs(), vec![0, -1]);

        x.assign(6);
        assert_eq!(x.value(), s(&[5, 6]));
        assert_eq!(x.timeline_len(), 2);
    }

    #[test]
    fn test_outside_write_after_run_is_dropped_by_next_run() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 0);
        let body_x = x.clone();
        rt.converge(move |_| {
            body_x.assign(1);
            Ok(())
        })
        .unwrap();
        assert_eq!(x.epochs(), vec![0, 2, 2]);

        x.assign(50);
        assert_eq!(x.epochs(), vec![0, 2, 2, OUTSIDE_RUN_EPOCH]);
        assert_eq!(x.value(), s(&[50]));

        let mut first_read = None;
        rt.converge(|_| {
            first_read.get_or_insert_with(|| x.value());
            x.assign(1);
            Ok(())
        })
        .unwrap();
        assert_eq!(first_read, Some(s(&[0])));
        assert!(!x.domain().contains(&50));
        assert_eq!(x.value(), s(&[1]));
    }

    #[test]
    fn test_every_write_bumps_version_and_domain() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 1);
        assert_eq!(x.version(), 0);
        x.commit(&x + 2);
        x.commit(&x * 10);
        assert_eq!(x.version(), 2);
        assert_eq!(x.domain(), vec![1, 3, 30]);
    }

    #[test]
    fn test_outside_run_reverse_replays_and_quarantines() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 4);
        x.commit(x.add(3));
        assert_eq!(x.value(), s(&[7]));
        assert_eq!(rt.ledger_depth(), 1);

        rt.set_entropy(Direction::Reverse);
        x.commit(x.add(3));
        assert_eq!(x.value(), s(&[4]));
        assert_eq!(x.epochs(), vec![0, -1]);
        assert_eq!(rt.ledger_depth(), 0);
    }

    #[test]
    fn test_reverse_with_empty_ledger_keeps_incoming() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 1);
        rt.set_entropy(Direction::Reverse);
        x.commit(x.mul(5));
        assert_eq!(x.value(), s(&[5]));
    }

    #[test]
    fn test_apply_committed_appends_without_logging() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 1);
        let _gate = x.write_gate();
        let version = x.apply_committed(s(&[9]));
        x.apply_committed(s(&[10]));
        assert_eq!(version, 1);
        assert_eq!(x.timeline_len(), 3);
        assert_eq!(rt.ledger_depth(), 0);
        assert_eq!(x.read_versioned(), (s(&[10]), 2));
    }

    #[test]
    fn test_reseed_discards_history() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", 1);
        x.assign(2);
        x.reseed(7);
        assert_eq!(x.slices(), vec![s(&[7])]);
        assert_eq!(x.domain(), vec![7]);
    }

    #[test]
    fn test_observe_collapses_to_smallest() {
        let rt = Runtime::<i64>::new();
        let x = rt.get_or_create("x", s(&[3, 1, 2]));
        assert_eq!(x.observe().unwrap(), 1);
    }
}
