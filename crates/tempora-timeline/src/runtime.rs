//! Runtime scope: registry, entropy, and ledger for one element type.
//!
//! Each [`Runtime`] is an independent universe. Two runtimes never share
//! variables, epochs, or ledger entries, so convergence runs on different
//! runtimes (or element types) may proceed concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tempora_types::{Direction, Superposition, TemporalValue};

use crate::Result;
use crate::convergence::{self, ConvergenceConfig, ConvergenceReport, HalfCycle, LoopOptions};
use crate::entropy::{EntropyController, EntropyState};
use crate::error::TemporalError;
use crate::ledger::OperationLedger;
use crate::variable::{TemporalVar, VarCell};

/// Identifier used by [`Runtime::get_or_create_default`].
pub const DEFAULT_VAR: &str = "default";

pub(crate) struct RuntimeShared<T: TemporalValue> {
    pub(crate) entropy: EntropyController,
    pub(crate) ledger: Mutex<OperationLedger<T>>,
    pub(crate) registry: DashMap<String, Arc<VarCell<T>>>,
    pub(crate) config: ConvergenceConfig,
}

/// Handle to a runtime scope. Clones share state.
pub struct Runtime<T: TemporalValue> {
    shared: Arc<RuntimeShared<T>>,
}

impl<T: TemporalValue> Clone for Runtime<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: TemporalValue> Default for Runtime<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TemporalValue> std::fmt::Debug for Runtime<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("element", &T::TYPE_NAME)
            .field("variables", &self.shared.registry.len())
            .field("entropy", &self.shared.entropy.snapshot())
            .finish()
    }
}

impl<T: TemporalValue> Runtime<T> {
    pub fn new() -> Self {
        Self::with_config(ConvergenceConfig::default())
    }

    pub fn with_config(config: ConvergenceConfig) -> Self {
        Self {
            shared: Arc::new(RuntimeShared {
                entropy: EntropyController::new(),
                ledger: Mutex::new(OperationLedger::new()),
                registry: DashMap::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.shared.config
    }

    /// Look up a variable by name, creating it with `initial` as its
    /// bootstrap slice if it does not exist. `initial` is ignored for
    /// existing variables.
    pub fn get_or_create(&self, name: &str, initial: impl Into<Superposition<T>>) -> TemporalVar<T> {
        let cell = self
            .shared
            .registry
            .entry(name.to_string())
            .or_insert_with(|| {
                let cell = Arc::new(VarCell::new(name, initial.into()));
                tracing::debug!(var = name, id = %cell.id(), "registered temporal variable");
                cell
            })
            .clone();
        TemporalVar::new(cell, Arc::clone(&self.shared))
    }

    pub fn get_or_create_default(&self, initial: impl Into<Superposition<T>>) -> TemporalVar<T> {
        self.get_or_create(DEFAULT_VAR, initial)
    }

    pub fn get(&self, name: &str) -> Option<TemporalVar<T>> {
        self.shared
            .registry
            .get(name)
            .map(|cell| TemporalVar::new(Arc::clone(cell.value()), Arc::clone(&self.shared)))
    }

    /// Every registered variable, in creation order.
    pub fn variables(&self) -> Vec<TemporalVar<T>> {
        let mut vars: Vec<_> = self
            .shared
            .registry
            .iter()
            .map(|cell| TemporalVar::new(Arc::clone(cell.value()), Arc::clone(&self.shared)))
            .collect();
        vars.sort_by_key(|v| v.id());
        vars
    }

    /// Set the direction. Returns the active epoch afterwards.
    pub fn set_entropy(&self, direction: Direction) -> i64 {
        self.shared.entropy.set_direction(direction)
    }

    /// Set the direction from a sign (`> 0` forward, `< 0` reverse).
    pub fn set_entropy_sign(&self, sign: i32) -> Result<i64> {
        let direction = Direction::from_sign(sign).ok_or(TemporalError::ZeroEntropy)?;
        Ok(self.set_entropy(direction))
    }

    pub fn entropy(&self) -> Direction {
        self.shared.entropy.direction()
    }

    pub fn entropy_state(&self) -> EntropyState {
        self.shared.entropy.snapshot()
    }

    pub fn active_epoch(&self) -> i64 {
        self.shared.entropy.active_epoch()
    }

    pub fn is_in_run(&self) -> bool {
        self.shared.entropy.in_run()
    }

    /// Number of logged ledger entries.
    pub fn ledger_depth(&self) -> usize {
        self.shared.ledger.lock().depth()
    }

    /// Logged ledger entries targeting `var`.
    pub fn ledger_depth_for(&self, var: &TemporalVar<T>) -> usize {
        self.shared.ledger.lock().depth_for(var.id())
    }

    /// Run `body` to convergence with default [`LoopOptions`].
    pub fn converge<F>(&self, body: F) -> Result<ConvergenceReport>
    where
        F: FnMut(&HalfCycle) -> Result<()>,
    {
        convergence::run_convergence_loop(self, body, LoopOptions::from_config(self.config()))
    }

    pub fn run_convergence_loop<F>(&self, body: F, options: LoopOptions) -> Result<ConvergenceReport>
    where
        F: FnMut(&HalfCycle) -> Result<()>,
    {
        convergence::run_convergence_loop(self, body, options)
    }

    pub(crate) fn shared(&self) -> &RuntimeShared<T> {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 1);
        let again = rt.get_or_create("a", 99);
        assert_eq!(a.id(), again.id());
        assert_eq!(again.value(), Superposition::scalar(1));
    }

    #[test]
    fn test_default_variable() {
        let rt = Runtime::<i64>::new();
        let v = rt.get_or_create_default(3);
        assert_eq!(v.name(), DEFAULT_VAR);
        assert_eq!(rt.get(DEFAULT_VAR).map(|v| v.id()), Some(v.id()));
        assert!(rt.get("missing").is_none());
    }

    #[test]
    fn test_variables_in_creation_order() {
        let rt = Runtime::<i64>::new();
        let z = rt.get_or_create("z", 0);
        let a = rt.get_or_create("a", 0);
        let ids: Vec<_> = rt.variables().iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec![z.id(), a.id()]);
    }

    #[test]
    fn test_zero_entropy_rejected() {
        let rt = Runtime::<i64>::new();
        assert!(matches!(rt.set_entropy_sign(0), Err(TemporalError::ZeroEntropy)));
        assert_eq!(rt.set_entropy_sign(-5).unwrap(), -1);
        assert_eq!(rt.entropy(), Direction::Reverse);
    }

    #[test]
    fn test_runtimes_are_isolated() {
        let one = Runtime::<i64>::new();
        let two = Runtime::<i64>::new();
        one.get_or_create("x", 1).assign(2);
        assert!(two.get("x").is_none());
        assert_eq!(two.ledger_depth(), 0);
        assert_eq!(one.ledger_depth(), 1);
    }
}
