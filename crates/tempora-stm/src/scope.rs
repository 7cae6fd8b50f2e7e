//! Ambient transaction scopes.
//!
//! [`TransactionScope::begin`] installs a transaction for the current
//! thread; [`TransactionScope::run_async`] installs one for the current
//! tokio task, where it survives `.await` points and executor thread hops.
//! The free functions [`record_read`], [`stage_write`] and
//! [`add_commit_hook`] operate on whichever is active, task scope first.
//!
//! Nested scopes flatten: an inner `begin` joins the outer transaction and
//! only the outermost scope commits. Rolling back an inner scope dooms the
//! whole transaction. A scope dropped while its thread is panicking counts
//! as a rollback.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tempora_timeline::{Superposition, TemporalValue, TemporalVar};
use tempora_types::TxId;
use tracing::{debug, error};

use crate::Result;
use crate::error::TxError;
use crate::manager::TransactionManager;
use crate::transaction::Transaction;

struct Frame {
    manager: TransactionManager,
    tx: Mutex<Option<Transaction>>,
    depth: AtomicUsize,
    doomed: AtomicBool,
}

impl Frame {
    fn new(manager: &TransactionManager) -> Arc<Self> {
        Arc::new(Self {
            manager: manager.clone(),
            tx: Mutex::new(Some(manager.begin())),
            depth: AtomicUsize::new(1),
            doomed: AtomicBool::new(false),
        })
    }

    /// Take the transaction and commit it, unless something doomed it.
    fn complete(&self) -> Result<()> {
        let Some(tx) = self.tx.lock().take() else {
            return Ok(());
        };
        if self.doomed.load(Ordering::SeqCst) {
            self.manager.rolled_back();
            return Err(TxError::RolledBack);
        }
        self.manager.commit(tx)
    }

    fn abandon(&self) {
        if self.tx.lock().take().is_some() {
            self.manager.rolled_back();
        }
    }
}

thread_local! {
    static THREAD_FRAME: RefCell<Option<Arc<Frame>>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_FRAME: Arc<Frame>;
}

fn ambient() -> Option<Arc<Frame>> {
    TASK_FRAME
        .try_with(Arc::clone)
        .ok()
        .or_else(|| THREAD_FRAME.with(|slot| slot.borrow().clone()))
}

fn with_ambient<R>(f: impl FnOnce(&mut Transaction) -> Result<R>) -> Result<R> {
    let frame = ambient().ok_or(TxError::NoAmbientTransaction)?;
    let mut slot = frame.tx.lock();
    let tx = slot.as_mut().ok_or(TxError::NoAmbientTransaction)?;
    f(tx)
}

/// Read `var` through the ambient transaction.
pub fn record_read<T: TemporalValue>(var: &TemporalVar<T>) -> Result<Superposition<T>> {
    with_ambient(|tx| tx.read(var))
}

/// Stage a write in the ambient transaction.
pub fn stage_write<T: TemporalValue>(var: &TemporalVar<T>, value: impl Into<Superposition<T>>) -> Result<()> {
    with_ambient(|tx| {
        tx.write(var, value);
        Ok(())
    })
}

/// Register a hook on the ambient transaction.
pub fn add_commit_hook(hook: impl FnOnce() + Send + 'static) -> Result<()> {
    with_ambient(|tx| {
        tx.on_commit(hook);
        Ok(())
    })
}

/// Id of the ambient transaction, if any.
pub fn current_tx_id() -> Option<TxId> {
    let frame = ambient()?;
    let id = frame.tx.lock().as_ref().map(Transaction::id);
    id
}

pub struct TransactionScope;

impl TransactionScope {
    /// Open a scope on the current thread, or join the ambient one.
    pub fn begin(manager: &TransactionManager) -> ScopeGuard {
        if let Some(frame) = ambient() {
            let depth = frame.depth.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(depth, "joined ambient transaction");
            return ScopeGuard::new(frame, false);
        }

        let frame = Frame::new(manager);
        THREAD_FRAME.with(|slot| *slot.borrow_mut() = Some(Arc::clone(&frame)));
        ScopeGuard::new(frame, true)
    }

    /// Run `f` with an ambient transaction bound to the current task.
    ///
    /// Commits when the future resolves `Ok`, rolls back on `Err`. Inside an
    /// existing scope, task or thread, `f` joins that transaction and the
    /// enclosing scope decides its outcome. A joined thread scope is carried
    /// across `.await` points like a task scope.
    pub async fn run_async<R, F, Fut>(manager: &TransactionManager, f: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if let Some(frame) = ambient() {
            debug!("joined ambient transaction");
            return TASK_FRAME.scope(frame, f()).await;
        }

        let frame = Frame::new(manager);
        let result = TASK_FRAME.scope(Arc::clone(&frame), async move { f().await }).await;
        match result {
            Ok(value) => {
                frame.complete()?;
                Ok(value)
            }
            Err(e) => {
                frame.abandon();
                Err(e)
            }
        }
    }
}

/// Handle on an open scope. Dropping an uncompleted outermost guard commits,
/// unless the thread is unwinding from a panic.
#[must_use = "dropping the guard commits the transaction"]
pub struct ScopeGuard {
    frame: Arc<Frame>,
    outermost: bool,
    completed: bool,
    // Thread-bound: the frame may live in a thread-local slot.
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    fn new(frame: Arc<Frame>, outermost: bool) -> Self {
        Self {
            frame,
            outermost,
            completed: false,
            _not_send: PhantomData,
        }
    }

    pub fn tx_id(&self) -> Option<TxId> {
        self.frame.tx.lock().as_ref().map(Transaction::id)
    }

    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    /// Open scopes sharing this transaction.
    pub fn depth(&self) -> usize {
        self.frame.depth.load(Ordering::SeqCst)
    }

    /// Commit. Inner scopes only close; the outermost scope commits.
    pub fn commit(mut self) -> Result<()> {
        self.completed = true;
        self.finish()
    }

    /// Discard the transaction. Inside a nested scope this dooms the
    /// outermost commit as well.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        self.completed = true;
        self.frame.depth.fetch_sub(1, Ordering::SeqCst);
        if self.outermost {
            self.uninstall();
            self.frame.abandon();
        } else {
            self.frame.doomed.store(true, Ordering::SeqCst);
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.frame.depth.fetch_sub(1, Ordering::SeqCst);
        if !self.outermost {
            return Ok(());
        }
        self.uninstall();
        self.frame.complete()
    }

    fn uninstall(&self) {
        THREAD_FRAME.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.as_ref().is_some_and(|f| Arc::ptr_eq(f, &self.frame)) {
                *slot = None;
            }
        });
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if std::thread::panicking() {
            debug!(outermost = self.outermost, "scope dropped during panic, rolling back");
            self.discard();
            return;
        }
        if let Err(e) = self.finish() {
            error!(error = %e, "implicit commit of transaction scope failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::StmCounter;
    use tempora_timeline::Runtime;

    #[test]
    fn test_free_functions_need_a_scope() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 1);
        assert!(matches!(record_read(&a), Err(TxError::NoAmbientTransaction)));
        assert!(matches!(stage_write(&a, 2), Err(TxError::NoAmbientTransaction)));
        assert!(current_tx_id().is_none());
    }

    #[test]
    fn test_commit_through_scope() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 1);
        let stm = TransactionManager::new();

        let scope = TransactionScope::begin(&stm);
        let value = record_read(&a).unwrap();
        stage_write(&a, value.map(|v| v + 1)).unwrap();
        assert_eq!(a.value(), Superposition::scalar(1));
        scope.commit().unwrap();

        assert_eq!(a.value(), Superposition::scalar(2));
        assert!(current_tx_id().is_none());
    }

    #[test]
    fn test_nested_scopes_flatten() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let b = rt.get_or_create("b", 0);
        let stm = TransactionManager::new();

        let outer = TransactionScope::begin(&stm);
        stage_write(&a, 1).unwrap();
        {
            let inner = TransactionScope::begin(&stm);
            assert!(!inner.is_outermost());
            assert_eq!(inner.depth(), 2);
            assert_eq!(inner.tx_id(), outer.tx_id());
            stage_write(&b, 1).unwrap();
            inner.commit().unwrap();
        }
        assert_eq!(b.value(), Superposition::scalar(0));
        outer.commit().unwrap();
        assert_eq!(a.value(), Superposition::scalar(1));
        assert_eq!(b.value(), Superposition::scalar(1));
    }

    #[test]
    fn test_inner_rollback_dooms_outer() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let stm = TransactionManager::new();

        let outer = TransactionScope::begin(&stm);
        stage_write(&a, 1).unwrap();
        TransactionScope::begin(&stm).rollback();
        assert!(matches!(outer.commit(), Err(TxError::RolledBack)));
        assert_eq!(a.value(), Superposition::scalar(0));
    }

    #[test]
    fn test_drop_commits_implicitly() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let stm = TransactionManager::new();
        {
            let _scope = TransactionScope::begin(&stm);
            stage_write(&a, 5).unwrap();
        }
        assert_eq!(a.value(), Superposition::scalar(5));
    }

    #[test]
    fn test_rollback_discards_and_skips_hooks() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let stm = TransactionManager::new();
        let fired = Arc::new(AtomicBool::new(false));

        let scope = TransactionScope::begin(&stm);
        stage_write(&a, 5).unwrap();
        let flag = Arc::clone(&fired);
        add_commit_hook(move || flag.store(true, Ordering::SeqCst)).unwrap();
        scope.rollback();

        assert_eq!(a.value(), Superposition::scalar(0));
        assert!(!fired.load(Ordering::SeqCst));
        assert!(current_tx_id().is_none());
    }

    #[test]
    fn test_panic_rolls_back_instead_of_committing() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let stm = TransactionManager::new();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _outer = TransactionScope::begin(&stm);
            stage_write(&a, 5).unwrap();
            let _inner = TransactionScope::begin(&stm);
            stage_write(&a, 6).unwrap();
            panic!("handler failed");
        }));

        assert!(outcome.is_err());
        assert_eq!(a.value(), Superposition::scalar(0));
        assert!(current_tx_id().is_none());
        let stats = stm.stats();
        assert_eq!(stats.get(StmCounter::TotalCommits), 0);
        assert_eq!(stats.get(StmCounter::TotalRollbacks), 1);
    }

    #[test]
    fn test_panic_in_inner_scope_dooms_outer() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let stm = TransactionManager::new();

        let outer = TransactionScope::begin(&stm);
        stage_write(&a, 1).unwrap();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _inner = TransactionScope::begin(&stm);
            panic!("inner step failed");
        }));

        assert!(outcome.is_err());
        assert_eq!(outer.depth(), 1);
        assert!(matches!(outer.commit(), Err(TxError::RolledBack)));
        assert_eq!(a.value(), Superposition::scalar(0));
    }

    #[test]
    fn test_run_async_joins_thread_scope() {
        let rt = Runtime::<i64>::new();
        let a = rt.get_or_create("a", 0);
        let stm = TransactionManager::new();
        let executor = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let scope = TransactionScope::begin(&stm);
        let outer_id = scope.tx_id();
        let inner_id = executor
            .block_on(TransactionScope::run_async(&stm, || async {
                stage_write(&a, 3)?;
                tokio::task::yield_now().await;
                Ok::<_, TxError>(current_tx_id())
            }))
            .unwrap();

        assert_eq!(inner_id, outer_id);
        assert_eq!(a.value(), Superposition::scalar(0));
        scope.commit().unwrap();
        assert_eq!(a.value(), Superposition::scalar(3));
        assert_eq!(stm.stats().get(StmCounter::TotalCommits), 1);
    }
}
