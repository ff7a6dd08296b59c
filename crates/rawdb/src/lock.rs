//! Admission control between ordinary transactions and the active batch
//!
//! Ordinary transactions register here before taking the page cache lock.
//! A transaction whose predicates conflict with the active batch's locks
//! waits until the batch releases them. Admitted transactions count as
//! *pending* until they actually hold the cache lock; a pending count
//! above zero is what makes `can_continue` ask a batch step to yield.

use crate::batch::{BatchLock, RawBatchControl};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};

struct Registration {
    predicates: Option<Vec<String>>,
    read_only: bool,
}

impl Registration {
    fn conflicts_with(&self, locks: &[BatchLock]) -> bool {
        locks
            .iter()
            .any(|lock| lock.blocks(self.predicates.as_deref(), self.read_only))
    }
}

#[derive(Default)]
struct LockState {
    active_batch: Option<Vec<BatchLock>>,
    running: FxHashMap<u64, Registration>,
    waiting: usize,
    pending: usize,
    next_id: u64,
}

impl LockState {
    fn blocked(&self, registration: &Registration) -> bool {
        match &self.active_batch {
            Some(locks) => registration.conflicts_with(locks),
            None => false,
        }
    }

    fn has_conflicting_running(&self) -> bool {
        match &self.active_batch {
            Some(locks) => self.running.values().any(|r| r.conflicts_with(locks)),
            None => false,
        }
    }
}

#[derive(Default)]
pub(crate) struct LockManager {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ordinary transaction, waiting while the active batch blocks it
    pub fn enter_transaction(
        &self,
        predicates: Option<Vec<String>>,
        read_only: bool,
    ) -> TransactionGuard<'_> {
        let registration = Registration {
            predicates,
            read_only,
        };
        let mut state = self.state.lock();
        if state.blocked(&registration) {
            state.waiting += 1;
            tracing::debug!(read_only, "transaction waits for batch locks");
            while state.blocked(&registration) {
                self.changed.wait(&mut state);
            }
            state.waiting -= 1;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.running.insert(id, registration);
        state.pending += 1;
        TransactionGuard {
            manager: self,
            id,
            pending: true,
        }
    }

    /// Install batch locks and wait until no conflicting transaction runs
    pub fn activate_batch(&self, locks: Vec<BatchLock>) -> BatchGuard<'_> {
        let mut state = self.state.lock();
        state.active_batch = Some(locks);
        while state.has_conflicting_running() {
            self.changed.wait(&mut state);
        }
        BatchGuard { manager: self }
    }

    /// Let admitted transactions run, then reinstall `locks`.
    ///
    /// Waits at most `yield_timeout` for pending transactions to take the
    /// cache, then for conflicting running transactions to finish.
    pub fn resume_batch(&self, locks: Vec<BatchLock>, yield_timeout: Duration) {
        let deadline = Instant::now() + yield_timeout;
        let mut state = self.state.lock();
        while state.pending > 0 {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.active_batch = Some(locks);
        self.changed.notify_all();
        tracing::trace!(waiting = state.waiting, "batch locks reinstalled");
        while state.has_conflicting_running() {
            self.changed.wait(&mut state);
        }
    }

    /// Check if admitted transactions are queued for the cache lock
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending > 0
    }

    /// Number of transactions blocked by batch locks
    #[cfg(test)]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    fn release_batch(&self) {
        let mut state = self.state.lock();
        state.active_batch = None;
        self.changed.notify_all();
    }

    fn leave(&self, id: u64, pending: bool) {
        let mut state = self.state.lock();
        state.running.remove(&id);
        if pending {
            state.pending -= 1;
        }
        self.changed.notify_all();
    }
}

/// Registration of one ordinary transaction
pub(crate) struct TransactionGuard<'a> {
    manager: &'a LockManager,
    id: u64,
    pending: bool,
}

impl TransactionGuard<'_> {
    /// The transaction now holds the cache lock
    pub fn started(&mut self) {
        if self.pending {
            self.pending = false;
            let mut state = self.manager.state.lock();
            state.pending -= 1;
            self.manager.changed.notify_all();
        }
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        self.manager.leave(self.id, self.pending);
    }
}

/// Active batch; dropping it releases the batch locks
pub(crate) struct BatchGuard<'a> {
    manager: &'a LockManager,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_batch();
    }
}

/// `RawBatchControl` for one run step
pub(crate) struct StepControl<'a> {
    manager: &'a LockManager,
    started: Instant,
    period: Duration,
}

impl<'a> StepControl<'a> {
    pub fn new(manager: &'a LockManager, period: Duration) -> Self {
        StepControl {
            manager,
            started: Instant::now(),
            period,
        }
    }
}

impl RawBatchControl for StepControl<'_> {
    fn can_continue(&self) -> bool {
        self.started.elapsed() < self.period && !self.manager.has_pending()
    }
}
