//! Bookkeeping for the locks an execution holds.

use crate::dependency::LockRequest;
use crate::error::CoreResult;
use crate::types::VariableId;
use lockstep_storage::{Lock, LockMode};
use std::sync::Arc;
use tracing::{trace, warn};

#[derive(Debug)]
struct HeldLock {
    variable: VariableId,
    mode: LockMode,
    lock: Arc<dyn Lock>,
}

/// The locks one execution has acquired, in acquisition order.
///
/// This set, not the dependency, decides what gets released: acquisition may
/// have stopped partway. Releasing drains the set, so no lock is released
/// twice. Locks still held when the set is dropped are released then.
#[derive(Debug, Default)]
pub(crate) struct AcquiredLocks {
    held: Vec<HeldLock>,
}

impl AcquiredLocks {
    /// Acquires `request`, waiting as long as necessary.
    pub(crate) fn acquire(&mut self, request: &LockRequest) -> CoreResult<()> {
        if self.holds(request) {
            return Ok(());
        }
        let lock = request.variable.lock_for(request.mode);
        lock.lock()?;
        self.remember(request, lock);
        Ok(())
    }

    /// Attempts to acquire `request` without waiting.
    ///
    /// Returns `Ok(false)` if the lock is held elsewhere.
    pub(crate) fn try_acquire(&mut self, request: &LockRequest) -> CoreResult<bool> {
        if self.holds(request) {
            return Ok(true);
        }
        let lock = request.variable.lock_for(request.mode);
        if !lock.try_lock()? {
            trace!(variable = %request.variable.id(), mode = %request.mode, "lock contended");
            return Ok(false);
        }
        self.remember(request, lock);
        Ok(true)
    }

    /// Releases every held lock in acquisition order.
    ///
    /// Keeps going past failures so that one broken lock does not strand the
    /// rest; the first failure is returned.
    pub(crate) fn release_all(&mut self) -> CoreResult<()> {
        let mut first_error = None;
        for held in self.held.drain(..) {
            trace!(variable = %held.variable, mode = %held.mode, "releasing lock");
            if let Err(e) = held.lock.unlock() {
                warn!(variable = %held.variable, mode = %held.mode, error = %e, "lock release failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Returns the held locks in acquisition order.
    pub(crate) fn snapshot(&self) -> Vec<(VariableId, LockMode)> {
        self.held
            .iter()
            .map(|held| (held.variable.clone(), held.mode))
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    fn holds(&self, request: &LockRequest) -> bool {
        self.held
            .iter()
            .any(|held| held.mode == request.mode && &held.variable == request.variable.id())
    }

    fn remember(&mut self, request: &LockRequest, lock: Arc<dyn Lock>) {
        trace!(variable = %request.variable.id(), mode = %request.mode, "lock acquired");
        self.held.push(HeldLock {
            variable: request.variable.id().clone(),
            mode: request.mode,
            lock,
        });
    }
}

impl Drop for AcquiredLocks {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            warn!(count = self.held.len(), "releasing locks of abandoned transaction");
            // Errors are already logged per lock.
            let _ = self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockOrdering;
    use crate::dependency::Dependency;
    use crate::variable::Variable;
    use lockstep_storage::{Driver, InMemoryLock, InMemoryPersistence, ReadWriteLock};

    fn variable_with_lock() -> (Variable<i64>, Arc<InMemoryLock>) {
        let lock = Arc::new(InMemoryLock::new());
        let driver = Driver::new(lock.clone(), Arc::new(InMemoryPersistence::new()));
        (Variable::new(crate::types::VariableId::random(), driver), lock)
    }

    fn single_request(dependency: &Dependency) -> LockRequest {
        dependency.lock_plan(LockOrdering::Declaration).remove(0)
    }

    #[test]
    fn acquire_then_release() {
        let (v, lock) = variable_with_lock();
        let request = single_request(&Dependency::writing(&v));
        let mut locks = AcquiredLocks::default();

        locks.acquire(&request).unwrap();
        assert!(lock.is_write_locked());
        assert_eq!(locks.snapshot(), vec![(v.id().clone(), LockMode::Write)]);

        locks.release_all().unwrap();
        assert!(!lock.is_write_locked());
        assert!(locks.is_empty());
    }

    #[test]
    fn repeated_request_is_held_once() {
        let (v, lock) = variable_with_lock();
        let request = single_request(&Dependency::reading(&v));
        let mut locks = AcquiredLocks::default();

        locks.acquire(&request).unwrap();
        assert!(locks.try_acquire(&request).unwrap());
        assert_eq!(lock.readers(), 1);

        locks.release_all().unwrap();
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn try_acquire_reports_contention() {
        let (v, lock) = variable_with_lock();
        lock.write_lock().lock().unwrap();
        let request = single_request(&Dependency::reading(&v));
        let mut locks = AcquiredLocks::default();

        assert!(!locks.try_acquire(&request).unwrap());
        assert!(locks.is_empty());
    }

    #[test]
    fn second_release_is_a_no_op() {
        let (v, lock) = variable_with_lock();
        let request = single_request(&Dependency::reading(&v));
        let mut locks = AcquiredLocks::default();

        locks.acquire(&request).unwrap();
        locks.release_all().unwrap();
        locks.release_all().unwrap();
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn drop_releases_held_locks() {
        let (v, lock) = variable_with_lock();
        let request = single_request(&Dependency::writing(&v));
        {
            let mut locks = AcquiredLocks::default();
            locks.acquire(&request).unwrap();
            assert!(lock.is_write_locked());
        }
        assert!(!lock.is_write_locked());
    }
}
