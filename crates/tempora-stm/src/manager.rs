//! Transaction manager: commit protocol, retry loop, and abort fallback.
//!
//! Commit takes the gate of every variable in the read and write sets in
//! ascending `VarId` order, validates read versions, applies the buffered
//! writes, releases the gates, then runs commit hooks. Read-only
//! transactions validate without locking.
//!
//! When aborts pile up (`fallback_abort_threshold` consecutive conflicts),
//! commits additionally serialize on one manager-wide lock until
//! [`TransactionManager::reset_fallback`] is called.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::{RetryPolicy, StmConfig};
use crate::error::TxError;
use crate::scope::TransactionScope;
use crate::stats::{StatsSnapshot, StmCounter, StmStats};
use crate::transaction::{CommitHook, Transaction};

struct ManagerInner {
    config: StmConfig,
    stats: StmStats,
    fallback_lock: Mutex<()>,
    fallback_active: AtomicBool,
}

/// Handle to a transaction manager. Clones share locks and telemetry.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.inner.config)
            .field("fallback_active", &self.is_fallback_active())
            .finish()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::with_config(StmConfig::default())
    }

    pub fn with_config(config: StmConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                stats: StmStats::default(),
                fallback_lock: Mutex::new(()),
                fallback_active: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &StmConfig {
        &self.inner.config
    }

    pub fn begin(&self) -> Transaction {
        Transaction::new()
    }

    /// Run `body` with the configured retry policy.
    pub fn run<R, F>(&self, body: F) -> Result<R>
    where
        F: FnMut(&mut Transaction) -> Result<R>,
    {
        self.run_with_retry(&self.inner.config.retry, body)
    }

    /// Run `body` in a fresh transaction, retrying on conflict.
    ///
    /// Body errors other than conflicts are returned immediately and the
    /// attempt's buffered writes are discarded.
    pub fn run_with_retry<R, F>(&self, policy: &RetryPolicy, mut body: F) -> Result<R>
    where
        F: FnMut(&mut Transaction) -> Result<R>,
    {
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            let mut tx = self.begin();
            let outcome = body(&mut tx).and_then(|value| self.commit(tx).map(|()| value));
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt < attempts {
                        self.inner.stats.incr(StmCounter::TotalRetries);
                        std::thread::sleep(policy.delay_for(attempt));
                    }
                }
                Err(e) => {
                    self.inner.stats.incr(StmCounter::TotalRollbacks);
                    return Err(e);
                }
            }
        }
        Err(self.exhausted(attempts))
    }

    /// Async form of [`run_with_retry`](Self::run_with_retry).
    ///
    /// Each attempt runs `f` inside its own ambient async scope, so the
    /// body uses [`record_read`](crate::record_read) and
    /// [`stage_write`](crate::stage_write) across `.await` points.
    pub async fn run_async_with_retry<R, F, Fut>(&self, policy: &RetryPolicy, mut f: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            match TransactionScope::run_async(self, &mut f).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt < attempts {
                        self.inner.stats.incr(StmCounter::TotalRetries);
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(self.exhausted(attempts))
    }

    fn exhausted(&self, attempts: u32) -> TxError {
        self.inner.stats.incr(StmCounter::TotalAborts);
        warn!(attempts, "transaction aborted, retries exhausted");
        TxError::Aborted { attempts }
    }

    /// Validate and apply `tx`.
    pub fn commit(&self, mut tx: Transaction) -> Result<()> {
        let hooks = std::mem::take(&mut tx.hooks);

        if tx.is_read_only() {
            if let Some(conflict) = tx.first_conflict() {
                return Err(self.conflict(conflict));
            }
            self.inner.stats.incr(StmCounter::TotalReadOnlyCommits);
            self.succeeded(hooks);
            return Ok(());
        }

        let cells = tx.lock_set();
        if self.inner.config.paranoid_lock_order {
            for pair in cells.windows(2) {
                let (prev, next) = (pair[0].cell_id(), pair[1].cell_id());
                if prev >= next {
                    return Err(TxError::LockOrderViolation { prev, next });
                }
            }
        }

        let fallback = self.is_fallback_active();
        {
            let _global = fallback.then(|| self.inner.fallback_lock.lock());
            let _gates: Vec<_> = cells.iter().map(|cell| cell.lock_gate()).collect();

            if let Some(conflict) = tx.first_conflict() {
                return Err(self.conflict(conflict));
            }
            for staged in tx.writes.values() {
                staged.apply();
            }
        }

        debug!(tx = %tx.id(), writes = tx.write_set_len(), "transaction committed");
        if fallback {
            self.inner.stats.incr(StmCounter::FallbackCommits);
        }
        self.succeeded(hooks);
        Ok(())
    }

    fn succeeded(&self, hooks: Vec<CommitHook>) {
        self.inner.stats.incr(StmCounter::TotalCommits);
        self.inner.stats.reset(StmCounter::ConsecutiveAborts);
        for hook in hooks {
            hook();
        }
    }

    fn conflict(&self, err: TxError) -> TxError {
        self.inner.stats.incr(StmCounter::TotalConflicts);
        let streak = self.inner.stats.incr(StmCounter::ConsecutiveAborts);
        if let Some(threshold) = self.inner.config.fallback_abort_threshold {
            if streak >= u64::from(threshold) && !self.inner.fallback_active.swap(true, Ordering::SeqCst) {
                warn!(streak, threshold, "abort streak exceeded threshold, serializing commits");
            }
        }
        debug!(error = %err, streak, "commit conflict");
        err
    }

    /// Record a discarded transaction.
    pub(crate) fn rolled_back(&self) {
        self.inner.stats.incr(StmCounter::TotalRollbacks);
    }

    pub fn is_fallback_active(&self) -> bool {
        self.inner.fallback_active.load(Ordering::SeqCst)
    }

    /// Leave fallback mode and clear the abort streak.
    pub fn reset_fallback(&self) {
        if self.inner.fallback_active.swap(false, Ordering::SeqCst) {
            info!("commit fallback lock released");
        }
        self.inner.stats.reset(StmCounter::ConsecutiveAborts);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Human-readable counter dump.
    pub fn report(&self) -> String {
        self.stats().report()
    }
}
