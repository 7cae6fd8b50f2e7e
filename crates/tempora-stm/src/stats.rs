//! Commit telemetry.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use strum::{AsRefStr, EnumCount, EnumIter, IntoEnumIterator};

/// Named counters kept by every transaction manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, EnumCount, EnumIter)]
pub enum StmCounter {
    TotalCommits,
    TotalReadOnlyCommits,
    TotalRetries,
    TotalConflicts,
    TotalAborts,
    TotalRollbacks,
    FallbackCommits,
    /// Gauge: aborts since the last successful commit.
    ConsecutiveAborts,
}

#[derive(Debug, Default)]
pub struct StmStats {
    counters: [AtomicU64; StmCounter::COUNT],
}

impl StmStats {
    pub fn incr(&self, counter: StmCounter) -> u64 {
        self.counters[counter as usize].fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset(&self, counter: StmCounter) {
        self.counters[counter as usize].store(0, Ordering::Relaxed);
    }

    pub fn get(&self, counter: StmCounter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            values: std::array::from_fn(|i| self.counters[i].load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    values: [u64; StmCounter::COUNT],
}

impl StatsSnapshot {
    pub fn get(&self, counter: StmCounter) -> u64 {
        self.values[counter as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (StmCounter, u64)> + '_ {
        StmCounter::iter().map(|c| (c, self.get(c)))
    }

    /// One `Label: value` line per counter.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (counter, value) in self.iter() {
            let _ = writeln!(out, "{:<22}{}", format!("{}:", counter.as_ref()), value);
        }
        out
    }
}
