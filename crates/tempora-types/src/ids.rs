//! Typed identifiers for temporal variables and transactions.
//!
//! Both ID types wrap a process-global monotonic `u64`. `VarId` ordering is
//! the total order the transaction manager acquires locks in, so ids must
//! never be reused within a process, even across runtimes of different
//! element types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A temporal variable identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(u64);

/// A transaction identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(u64);

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $counter:ident, $prefix:literal) => {
        impl $T {
            /// Allocate the next id from the process-global counter.
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::SeqCst))
            }

            /// The raw counter value.
            pub fn get(&self) -> u64 {
                self.0
            }

            /// Rebuild from a raw value. Only meaningful for values obtained
            /// from [`Self::get`] in the same process.
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($T), "({})"), self.0)
            }
        }
    };
}

impl_typed_id!(VarId, NEXT_VAR_ID, "var");
impl_typed_id!(TxId, NEXT_TX_ID, "tx");
