//! Convergence engine.
//!
//! Runs caller-supplied code once per half-cycle, alternating direction
//! and starting in reverse, until every variable written during the run
//! reports a stable cycle. On convergence the history is optionally
//! unified and one final forward pass runs against the unified state.

use serde::{Deserialize, Serialize};
use tempora_types::{Direction, TemporalValue};
use tracing::{debug, info};

use crate::Result;
use crate::entropy::EntropyController;
use crate::error::TemporalError;
use crate::runtime::{Runtime, RuntimeShared};
use crate::variable::{HalfCycleFlags, TemporalVar};

/// Engine settings, usually loaded as part of the application config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Upper bound on half-cycles before a run fails with
    /// [`TemporalError::NoConvergence`].
    pub max_half_cycles: usize,
    /// How far back cycle folding scans for a repeat of the newest slice.
    pub cycle_window: usize,
    pub run_final_iteration: bool,
    pub unify_on_convergence: bool,
    pub bail_on_first_reverse_when_idle: bool,
    /// When not unifying, fold only the detected cycle of each variable.
    pub fold_cycles: bool,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_half_cycles: 1000,
            cycle_window: 20,
            run_final_iteration: true,
            unify_on_convergence: true,
            bail_on_first_reverse_when_idle: false,
            fold_cycles: false,
        }
    }
}

/// Per-run options. Defaults come from [`ConvergenceConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopOptions {
    pub run_final_iteration: bool,
    pub unify_on_convergence: bool,
    pub bail_on_first_reverse_when_idle: bool,
    pub fold_cycles: bool,
    pub max_half_cycles: usize,
    pub cycle_window: usize,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from_config(&ConvergenceConfig::default())
    }
}

impl LoopOptions {
    pub fn from_config(config: &ConvergenceConfig) -> Self {
        Self {
            run_final_iteration: config.run_final_iteration,
            unify_on_convergence: config.unify_on_convergence,
            bail_on_first_reverse_when_idle: config.bail_on_first_reverse_when_idle,
            fold_cycles: config.fold_cycles,
            max_half_cycles: config.max_half_cycles,
            cycle_window: config.cycle_window,
        }
    }

    pub fn run_final_iteration(mut self, yes: bool) -> Self {
        self.run_final_iteration = yes;
        self
    }

    pub fn unify_on_convergence(mut self, yes: bool) -> Self {
        self.unify_on_convergence = yes;
        self
    }

    pub fn bail_on_first_reverse_when_idle(mut self, yes: bool) -> Self {
        self.bail_on_first_reverse_when_idle = yes;
        self
    }

    pub fn fold_cycles(mut self, yes: bool) -> Self {
        self.fold_cycles = yes;
        self
    }

    pub fn max_half_cycles(mut self, limit: usize) -> Self {
        self.max_half_cycles = limit;
        self
    }
}

/// Context handed to the loop body on every pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HalfCycle {
    /// 1-based half-cycle number. The final iteration continues the count.
    pub index: usize,
    pub direction: Direction,
    pub epoch: i64,
    /// This is the extra forward pass after convergence.
    pub is_final: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Every participating variable reached a stable cycle.
    Converged,
    /// Nothing was written on the first reverse half-cycle.
    Idle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub outcome: LoopOutcome,
    /// Half-cycles executed, excluding the final iteration.
    pub half_cycles: usize,
    /// Detected cycle length per variable written during the run.
    pub cycle_lengths: Vec<(String, usize)>,
    pub final_iteration_ran: bool,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.outcome == LoopOutcome::Converged
    }
}

/// Leaves run mode when dropped, including when the body fails.
struct RunGuard<'a> {
    entropy: &'a EntropyController,
}

impl<'a> RunGuard<'a> {
    fn enter(entropy: &'a EntropyController) -> Result<Self> {
        entropy.enter_run()?;
        Ok(Self { entropy })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.entropy.exit_run();
    }
}

/// Drive `body` until every participating variable converges.
pub fn run_convergence_loop<T, F>(
    runtime: &Runtime<T>,
    mut body: F,
    options: LoopOptions,
) -> Result<ConvergenceReport>
where
    T: TemporalValue,
    F: FnMut(&HalfCycle) -> Result<()>,
{
    let shared = runtime.shared();
    let _run = RunGuard::enter(&shared.entropy)?;
    prepare(runtime, shared);
    info!(
        element = T::TYPE_NAME,
        variables = runtime.variables().len(),
        max_half_cycles = options.max_half_cycles,
        "convergence run started"
    );

    let mut direction = Direction::Reverse;
    let mut half_cycles = 0;
    let outcome = loop {
        if half_cycles >= options.max_half_cycles {
            let unsettled = unsettled(runtime);
            return Err(TemporalError::NoConvergence {
                half_cycles,
                unsettled,
            });
        }
        half_cycles += 1;

        let pass = begin_half_cycle(runtime, shared, half_cycles, direction, false);
        body(&pass)?;
        if direction == Direction::Reverse {
            shared.ledger.lock().close_frame();
        }

        if half_cycles == 1 && options.bail_on_first_reverse_when_idle && !any_appended(runtime) {
            debug!("nothing appended on first reverse half-cycle, bailing");
            break LoopOutcome::Idle;
        }

        if unsettled(runtime).is_empty() {
            break LoopOutcome::Converged;
        }
        direction = direction.flip();
    };

    let cycle_lengths: Vec<(String, usize)> = participants(runtime)
        .iter()
        .map(|v| (v.name().to_string(), v.converged()))
        .collect();

    let mut final_iteration_ran = false;
    if outcome == LoopOutcome::Converged {
        info!(half_cycles, ?cycle_lengths, "convergence reached");
        for var in participants(runtime) {
            if options.unify_on_convergence {
                var.unify_all();
            } else if options.fold_cycles {
                var.fold_cycle_within(options.cycle_window);
            }
        }

        if options.run_final_iteration {
            let pass = begin_half_cycle(runtime, shared, half_cycles + 1, Direction::Forward, true);
            body(&pass)?;
            final_iteration_ran = true;
        }
    }

    finish(runtime, shared);
    Ok(ConvergenceReport {
        outcome,
        half_cycles,
        cycle_lengths,
        final_iteration_ran,
    })
}

/// Drop out-of-run writes and reset per-run bookkeeping.
fn prepare<T: TemporalValue>(runtime: &Runtime<T>, shared: &RuntimeShared<T>) {
    for var in runtime.variables() {
        let mut state = var.cell.state.write();
        if state.timeline.has_outside_run_writes() {
            debug!(var = var.name(), "discarding writes made outside a run");
            state.timeline.truncate_to_bootstrap();
            state.reseed_domain();
            state.version += 1;
        }
        state.run_writes = 0;
        state.flags = HalfCycleFlags::default();
    }
    shared.ledger.lock().clear();
}

fn begin_half_cycle<T: TemporalValue>(
    runtime: &Runtime<T>,
    shared: &RuntimeShared<T>,
    index: usize,
    direction: Direction,
    is_final: bool,
) -> HalfCycle {
    let epoch = shared.entropy.set_direction(direction);
    for var in runtime.variables() {
        var.cell.state.write().flags = HalfCycleFlags::default();
    }
    if direction == Direction::Forward {
        shared.ledger.lock().push_boundary(epoch);
    }
    debug!(index, %direction, epoch, is_final, "half-cycle");
    HalfCycle {
        index,
        direction,
        epoch,
        is_final,
    }
}

fn finish<T: TemporalValue>(runtime: &Runtime<T>, shared: &RuntimeShared<T>) {
    shared.ledger.lock().clear();
    for var in runtime.variables() {
        var.cell.state.write().reseed_domain();
    }
}

/// Variables written at least once during the current run.
fn participants<T: TemporalValue>(runtime: &Runtime<T>) -> Vec<TemporalVar<T>> {
    runtime
        .variables()
        .into_iter()
        .filter(|v| v.cell.state.read().run_writes > 0)
        .collect()
}

fn unsettled<T: TemporalValue>(runtime: &Runtime<T>) -> Vec<String> {
    participants(runtime)
        .into_iter()
        .filter(|v| v.converged() == 0)
        .map(|v| v.name().to_string())
        .collect()
}

fn any_appended<T: TemporalValue>(runtime: &Runtime<T>) -> bool {
    runtime
        .variables()
        .iter()
        .any(|v| v.cell.state.read().flags.bootstrap_superseded)
}
