//! Entropy controller: time direction and epoch counter for one runtime.
//!
//! Epoch tags count half-cycles within a convergence run. A new epoch
//! begins exactly when the direction changes inside a run; outside a run
//! every write is tagged [`OUTSIDE_RUN_EPOCH`].

use parking_lot::RwLock;
use tempora_types::{Direction, OUTSIDE_RUN_EPOCH};

use crate::error::TemporalError;

/// Point-in-time view of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntropyState {
    pub direction: Direction,
    /// Epoch counter. Only meaningful while `in_run`.
    pub epoch: i64,
    pub in_run: bool,
}

impl EntropyState {
    /// Epoch to tag a write with right now.
    pub fn active_epoch(&self) -> i64 {
        if self.in_run { self.epoch } else { OUTSIDE_RUN_EPOCH }
    }
}

#[derive(Debug)]
pub struct EntropyController {
    state: RwLock<EntropyState>,
}

impl Default for EntropyController {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropyController {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EntropyState {
                direction: Direction::Forward,
                epoch: OUTSIDE_RUN_EPOCH,
                in_run: false,
            }),
        }
    }

    pub fn snapshot(&self) -> EntropyState {
        *self.state.read()
    }

    pub fn direction(&self) -> Direction {
        self.state.read().direction
    }

    pub fn active_epoch(&self) -> i64 {
        self.state.read().active_epoch()
    }

    pub fn in_run(&self) -> bool {
        self.state.read().in_run
    }

    /// Set the direction. Inside a run a change of direction opens a new
    /// epoch. Returns the active epoch afterwards.
    pub fn set_direction(&self, direction: Direction) -> i64 {
        let mut state = self.state.write();
        if state.in_run && state.direction != direction {
            state.epoch += 1;
            tracing::debug!(epoch = state.epoch, %direction, "entropy flipped, new epoch");
        }
        state.direction = direction;
        state.active_epoch()
    }

    /// Enter run mode. The first reverse half-cycle then lands in epoch 1.
    pub(crate) fn enter_run(&self) -> Result<(), TemporalError> {
        let mut state = self.state.write();
        if state.in_run {
            return Err(TemporalError::RunInProgress);
        }
        *state = EntropyState {
            direction: Direction::Forward,
            epoch: 0,
            in_run: true,
        };
        Ok(())
    }

    /// Leave run mode. The direction is restored to forward.
    pub(crate) fn exit_run(&self) {
        let mut state = self.state.write();
        *state = EntropyState {
            direction: Direction::Forward,
            epoch: OUTSIDE_RUN_EPOCH,
            in_run: false,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_run_epoch_is_fixed() {
        let ctl = EntropyController::new();
        assert_eq!(ctl.set_direction(Direction::Reverse), OUTSIDE_RUN_EPOCH);
        assert_eq!(ctl.set_direction(Direction::Forward), OUTSIDE_RUN_EPOCH);
    }

    #[test]
    fn test_epoch_bumps_only_on_flip() {
        let ctl = EntropyController::new();
        ctl.enter_run().unwrap();
        assert_eq!(ctl.set_direction(Direction::Reverse), 1);
        assert_eq!(ctl.set_direction(Direction::Reverse), 1);
        assert_eq!(ctl.set_direction(Direction::Forward), 2);
        ctl.exit_run();
        assert_eq!(ctl.active_epoch(), OUTSIDE_RUN_EPOCH);
        assert_eq!(ctl.direction(), Direction::Forward);
    }

    #[test]
    fn test_nested_run_rejected() {
        let ctl = EntropyController::new();
        ctl.enter_run().unwrap();
        assert!(matches!(ctl.enter_run(), Err(TemporalError::RunInProgress)));
    }
}
