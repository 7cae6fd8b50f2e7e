//! Entropy direction and epoch tags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Epoch tag of the bootstrap (seed) slice.
pub const BOOTSTRAP_EPOCH: i64 = 0;

/// Epoch tag of slices written outside any convergence run.
pub const OUTSIDE_RUN_EPOCH: i64 = -1;

/// Time direction a write is performed under.
///
/// Forward writes behave like ordinary mutation and are logged; reverse
/// writes reconstruct what the value must have been before the logged
/// operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    #[default]
    #[strum(serialize = "forward", serialize = "fwd", serialize = "+")]
    Forward,
    #[strum(serialize = "reverse", serialize = "rev", serialize = "-")]
    Reverse,
}

impl Direction {
    /// Map an entropy sign to a direction: `> 0` forward, `< 0` reverse.
    ///
    /// Zero has no direction.
    pub fn from_sign(sign: i32) -> Option<Self> {
        match sign.signum() {
            1 => Some(Direction::Forward),
            -1 => Some(Direction::Reverse),
            _ => None,
        }
    }

    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// `1` for forward, `-1` for reverse.
    pub fn sign(&self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }

    /// The opposite direction.
    pub fn flip(&self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
