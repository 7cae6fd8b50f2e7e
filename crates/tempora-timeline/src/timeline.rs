//! Per-variable timeline store.
//!
//! A timeline is an ordered list of slices with a parallel list of epoch
//! tags. Both lists always have the same length and are never empty; slice
//! 0 is the bootstrap (epoch 0) and ordinary writes never merge into or
//! replace it. Requests that would touch the bootstrap append instead.

use tempora_types::{BOOTSTRAP_EPOCH, OUTSIDE_RUN_EPOCH, Superposition, TemporalValue};

/// Ordered slices of one temporal variable.
#[derive(Clone, Debug)]
pub struct Timeline<T: Ord> {
    slices: Vec<Superposition<T>>,
    epochs: Vec<i64>,
}

impl<T: TemporalValue> Timeline<T> {
    /// A timeline holding only the bootstrap slice.
    pub fn new(seed: Superposition<T>) -> Self {
        Self {
            slices: vec![seed],
            epochs: vec![BOOTSTRAP_EPOCH],
        }
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Never true; a timeline always holds its bootstrap slice.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> &[Superposition<T>] {
        &self.slices
    }

    pub fn epochs(&self) -> &[i64] {
        &self.epochs
    }

    pub fn bootstrap(&self) -> &Superposition<T> {
        &self.slices[0]
    }

    pub fn last(&self) -> &Superposition<T> {
        &self.slices[self.slices.len() - 1]
    }

    pub fn last_epoch(&self) -> i64 {
        self.epochs[self.epochs.len() - 1]
    }

    /// Append a new slice tagged with `epoch`.
    pub fn snapshot_append(&mut self, value: Superposition<T>, epoch: i64) {
        self.slices.push(value);
        self.epochs.push(epoch);
    }

    /// Overwrite the last slice and re-stamp its epoch.
    pub fn replace_last(&mut self, value: Superposition<T>, epoch: i64) {
        if self.slices.len() == 1 {
            self.snapshot_append(value, epoch);
            return;
        }
        let last = self.slices.len() - 1;
        self.slices[last] = value;
        self.epochs[last] = epoch;
    }

    /// Merge `value`'s candidates into the last slice.
    pub fn union_last(&mut self, value: &Superposition<T>, epoch: i64) {
        if self.slices.len() == 1 {
            self.snapshot_append(value.clone(), epoch);
            return;
        }
        let last = self.slices.len() - 1;
        self.slices[last] = self.slices[last].union(value);
    }

    /// Fold every slice from `index` onward into one union slice.
    ///
    /// `index` is clamped to 1 so the bootstrap is never folded. The folded
    /// slice keeps the newest epoch tag of the run it replaces.
    pub fn unify_from(&mut self, index: usize) {
        let start = index.max(1);
        if start >= self.slices.len() {
            return;
        }
        let merged = Superposition::union_all(&self.slices[start..]);
        let epoch = self.last_epoch();
        self.slices.truncate(start);
        self.epochs.truncate(start);
        self.snapshot_append(merged, epoch);
    }

    /// Fold the newest `count` slices (bootstrap excluded).
    pub fn unify_last(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let start = self.slices.len().saturating_sub(count);
        self.unify_from(start);
    }

    /// Fold all post-bootstrap history into one slice.
    pub fn unify_all(&mut self) {
        self.unify_from(1);
    }

    /// Detect a short cycle ending at the newest slice and fold it.
    ///
    /// Scans back up to `window` slices for one set-equal to the newest,
    /// then folds that slice and everything after it into one. Returns the
    /// cycle length, or `None` if no repeat was found.
    pub fn fold_recent_cycle(&mut self, window: usize) -> Option<usize> {
        let last = self.slices.len().checked_sub(1)?;
        if last < 2 {
            return None;
        }
        let lowest = last.saturating_sub(window).max(1);
        let newest = &self.slices[last];
        let start = (lowest..last).rev().find(|&j| self.slices[j].set_eq(newest))?;
        self.unify_from(start);
        Some(last - start)
    }

    /// Cycle length of the newest slice, or 0 if not yet stable.
    ///
    /// 0 with fewer than three slices; 1 when the last two slices are
    /// set-equal; otherwise the distance back to the nearest earlier slice
    /// set-equal to the newest; 0 when none matches.
    pub fn converged(&self) -> usize {
        if self.slices.len() < 3 {
            return 0;
        }
        let last = self.slices.len() - 1;
        let newest = &self.slices[last];
        (0..last)
            .rev()
            .find(|&j| self.slices[j].set_eq(newest))
            .map(|j| last - j)
            .unwrap_or(0)
    }

    /// Newest slice tagged with `epoch`, falling back to the newest slice.
    pub fn current_for_epoch(&self, epoch: i64) -> &Superposition<T> {
        self.epochs
            .iter()
            .rposition(|&e| e == epoch)
            .map(|i| &self.slices[i])
            .unwrap_or_else(|| self.last())
    }

    /// Newest slice written before `epoch` began.
    pub fn baseline_before(&self, epoch: i64) -> &Superposition<T> {
        self.epochs
            .iter()
            .rposition(|&e| e != epoch)
            .map(|i| &self.slices[i])
            .unwrap_or_else(|| self.bootstrap())
    }

    /// Whether any slice was written outside a convergence run.
    pub fn has_outside_run_writes(&self) -> bool {
        self.epochs.contains(&OUTSIDE_RUN_EPOCH)
    }

    /// Drop everything but the bootstrap slice.
    pub fn truncate_to_bootstrap(&mut self) {
        self.slices.truncate(1);
        self.epochs.truncate(1);
    }

    /// Replace the history with bootstrap plus a single out-of-run slice.
    pub fn quarantine(&mut self, value: Superposition<T>) {
        self.truncate_to_bootstrap();
        self.snapshot_append(value, OUTSIDE_RUN_EPOCH);
    }

    /// Replace the bootstrap slice wholesale and discard derived history.
    pub fn reseed(&mut self, value: Superposition<T>) {
        self.slices = vec![value];
        self.epochs = vec![BOOTSTRAP_EPOCH];
    }
}
