//! Optimistic transactional memory over tempora variables.
//!
//! Transactions buffer their writes and record the version of every
//! variable they read. Commit locks the touched variables in ascending
//! `VarId` order, checks that no read went stale, and installs the writes
//! as new timeline slices. Conflicting transactions are retried with
//! exponential backoff.
//!
//! # Example
//!
//! ```
//! use tempora_stm::TransactionManager;
//! use tempora_timeline::{Runtime, Superposition};
//!
//! let rt = Runtime::<i64>::new();
//! let from = rt.get_or_create("from", 100);
//! let to = rt.get_or_create("to", 0);
//! let stm = TransactionManager::new();
//!
//! stm.run(|tx| {
//!     let f = tx.read(&from)?;
//!     let t = tx.read(&to)?;
//!     tx.write(&from, f.map(|v| v - 10));
//!     tx.write(&to, t.map(|v| v + 10));
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert_eq!(from.value(), Superposition::scalar(90));
//! assert_eq!(to.value(), Superposition::scalar(10));
//! ```

mod cell;
pub mod config;
mod error;
mod manager;
pub mod scope;
pub mod stats;
mod transaction;

pub use cell::TxCell;
pub use config::{RetryPolicy, StmConfig};
pub use error::TxError;
pub use manager::TransactionManager;
pub use scope::{ScopeGuard, TransactionScope, add_commit_hook, current_tx_id, record_read, stage_write};
pub use stats::{StatsSnapshot, StmCounter, StmStats};
pub use transaction::Transaction;

/// Result type for transactional operations.
pub type Result<T> = std::result::Result<T, TxError>;
