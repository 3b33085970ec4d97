//! The transaction execution state machine.

use crate::config::Config;
use crate::context::Context;
use crate::dependency::{Dependency, LockRequest};
use crate::error::{CoreError, CoreResult};
use crate::transaction::locks::AcquiredLocks;
use crate::types::{ExecutionState, VariableId};
use lockstep_storage::LockMode;
use tracing::{debug, warn};

/// One attempt at running a transaction.
///
/// ```text
/// STANDBY --begin/try_begin--> RUNNING --commit--> COMMITTED
///                                      \--abort---> ABORTED
/// ```
///
/// Any other call fails with [`CoreError::IllegalState`] and leaves locks
/// untouched. An execution is used once and then discarded.
///
/// ## Failure semantics
///
/// - A backend failure while acquiring locks releases whatever was acquired
///   and leaves the execution in STANDBY.
/// - A backend failure during commit still releases every held lock and
///   moves the execution to ABORTED; variables persisted before the failure
///   stay persisted. There is no rollback across variables.
/// - A dependency that declares two different pieces of state under one
///   id fails to begin before any lock is taken.
/// - Dropping a RUNNING execution releases its locks.
///
/// # Example
///
/// ```rust
/// use lockstep_core::{Dependency, TransactionExecution, Variable};
///
/// let balance = Variable::in_memory_with(10_i64);
///
/// let mut execution = TransactionExecution::new();
/// let context = execution.begin(Dependency::writing(&balance)).unwrap();
/// let current = context.read(&balance).unwrap().unwrap_or(0);
/// context.write(&balance, current - 3).unwrap();
/// execution.commit().unwrap();
///
/// assert_eq!(balance.driver().persistence().read().unwrap(), Some(7));
/// ```
#[derive(Debug)]
pub struct TransactionExecution {
    config: Config,
    state: ExecutionState,
    context: Option<Context>,
    locks: AcquiredLocks,
}

impl TransactionExecution {
    /// Creates an execution with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an execution with `config`.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            state: ExecutionState::Standby,
            context: None,
            locks: AcquiredLocks::default(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Returns the locks currently held, in acquisition order.
    #[must_use]
    pub fn held_locks(&self) -> Vec<(VariableId, LockMode)> {
        self.locks.snapshot()
    }

    /// Acquires every lock `dependency` needs, waiting as long as necessary,
    /// and returns the transaction's context.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] unless in STANDBY,
    /// [`CoreError::ConflictingVariable`] before taking any lock, or the
    /// backend error that interrupted lock acquisition or value
    /// materialization.
    pub fn begin(&mut self, dependency: Dependency) -> CoreResult<&mut Context> {
        self.ensure_state(ExecutionState::Standby)?;
        dependency.check_identities()?;
        for request in dependency.lock_plan(self.config.lock_ordering) {
            if let Err(e) = self.locks.acquire(&request) {
                self.release_after_failure();
                return Err(e);
            }
        }
        self.prepare(dependency)
    }

    /// Acquires every lock `dependency` needs without waiting.
    ///
    /// Returns `Ok(None)` as soon as any lock is held elsewhere, after
    /// releasing every lock this attempt acquired. The execution stays in
    /// STANDBY and may be retried.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] unless in STANDBY,
    /// [`CoreError::ConflictingVariable`] before taking any lock, or a
    /// backend error.
    pub fn try_begin(&mut self, dependency: Dependency) -> CoreResult<Option<&mut Context>> {
        self.ensure_state(ExecutionState::Standby)?;
        dependency.check_identities()?;
        let plan = dependency.lock_plan(self.config.lock_ordering);
        match self.try_acquire_all(&plan) {
            Ok(true) => self.prepare(dependency).map(Some),
            Ok(false) => {
                debug!(locks = plan.len(), "lock contention, begin rolled back");
                self.locks.release_all()?;
                Ok(None)
            }
            Err(e) => {
                self.release_after_failure();
                Err(e)
            }
        }
    }

    /// Returns the context of the running transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] unless RUNNING.
    pub fn context(&mut self) -> CoreResult<&mut Context> {
        let actual = self.state;
        self.context
            .as_mut()
            .ok_or(CoreError::illegal_state(ExecutionState::Running, actual))
    }

    /// Persists staged writes, folds queued commutations into the persisted
    /// values, then releases every held lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] unless RUNNING. A backend error is
    /// returned after all locks have been released; the execution is then
    /// ABORTED and the variables persisted before the failure keep their new
    /// values.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_state(ExecutionState::Running)?;
        let mut context = self
            .context
            .take()
            .ok_or(CoreError::illegal_state(ExecutionState::Running, self.state))?;

        let applied = context.apply();
        let released = self.locks.release_all();

        match applied {
            Ok(()) => {
                self.state = ExecutionState::Committed;
                debug!(
                    writes = context.dependency().writes().count(),
                    commutations = context.dependency().commutations().count(),
                    "transaction committed"
                );
                released
            }
            Err(e) => {
                self.state = ExecutionState::Aborted;
                warn!(error = %e, "commit failed, locks released, outcome partially applied");
                Err(e)
            }
        }
    }

    /// Releases every held lock without persisting anything.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] unless RUNNING, or the first lock
    /// release failure (the execution is ABORTED regardless).
    pub fn abort(&mut self) -> CoreResult<()> {
        self.ensure_state(ExecutionState::Running)?;
        self.context = None;
        self.state = ExecutionState::Aborted;
        debug!("transaction aborted");
        self.locks.release_all()
    }

    fn try_acquire_all(&mut self, plan: &[LockRequest]) -> CoreResult<bool> {
        for request in plan {
            if !self.locks.try_acquire(request)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn prepare(&mut self, dependency: Dependency) -> CoreResult<&mut Context> {
        let context = match Context::prepare(dependency) {
            Ok(context) => context,
            Err(e) => {
                self.release_after_failure();
                return Err(e);
            }
        };
        debug!(
            reads = context.dependency().reads().count(),
            writes = context.dependency().writes().count(),
            commutations = context.dependency().commutations().count(),
            "transaction running"
        );
        self.state = ExecutionState::Running;
        Ok(self.context.insert(context))
    }

    fn release_after_failure(&mut self) {
        // The original failure is the one worth reporting.
        if let Err(e) = self.locks.release_all() {
            warn!(error = %e, "releasing locks after failed begin");
        }
    }

    fn ensure_state(&self, expected: ExecutionState) -> CoreResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::illegal_state(expected, self.state))
        }
    }
}

impl Default for TransactionExecution {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockOrdering;
    use crate::variable::Variable;
    use lockstep_storage::{
        Driver, InMemoryLock, InMemoryPersistence, Persistence, ReadWriteLock, StorageError,
        StorageResult,
    };
    use std::sync::Arc;

    fn locked_variable(value: i64) -> (Variable<i64>, Arc<InMemoryLock>) {
        let lock = Arc::new(InMemoryLock::new());
        let driver = Driver::new(
            lock.clone(),
            Arc::new(InMemoryPersistence::with_value(value)),
        );
        (Variable::new(VariableId::random(), driver), lock)
    }

    struct BrokenPersistence;

    impl Persistence<i64> for BrokenPersistence {
        fn read(&self) -> StorageResult<Option<i64>> {
            Ok(Some(0))
        }

        fn write(&self, _value: i64) -> StorageResult<()> {
            Err(StorageError::unavailable("disk detached"))
        }
    }

    #[test]
    fn begin_commit_persists_writes() {
        let (v, lock) = locked_variable(1);
        let mut execution = TransactionExecution::new();

        let context = execution.begin(Dependency::writing(&v)).unwrap();
        context.write(&v, 2).unwrap();
        assert!(lock.is_write_locked());
        assert_eq!(execution.state(), ExecutionState::Running);

        execution.commit().unwrap();
        assert_eq!(execution.state(), ExecutionState::Committed);
        assert!(!lock.is_write_locked());
        assert_eq!(v.driver().persistence().read().unwrap(), Some(2));
    }

    #[test]
    fn commit_folds_commutations_over_fresh_value() {
        let (v, _lock) = locked_variable(10);
        let mut execution = TransactionExecution::new();

        let context = execution.begin(Dependency::commuting(&v)).unwrap();
        context.commute(&v, |x: Option<i64>| x.unwrap_or(0) + 1).unwrap();
        context.commute(&v, |x: Option<i64>| x.unwrap_or(0) * 2).unwrap();
        execution.commit().unwrap();

        assert_eq!(v.driver().persistence().read().unwrap(), Some(22));
    }

    #[test]
    fn abort_releases_without_persisting() {
        let (v, lock) = locked_variable(1);
        let mut execution = TransactionExecution::new();

        let context = execution.begin(Dependency::writing(&v)).unwrap();
        context.write(&v, 5).unwrap();
        execution.abort().unwrap();

        assert_eq!(execution.state(), ExecutionState::Aborted);
        assert!(!lock.is_write_locked());
        assert_eq!(v.driver().persistence().read().unwrap(), Some(1));
    }

    #[test]
    fn out_of_order_calls_are_illegal() {
        let (v, lock) = locked_variable(1);
        let mut execution = TransactionExecution::new();

        assert!(execution.commit().unwrap_err().is_illegal_state());
        assert!(execution.abort().unwrap_err().is_illegal_state());
        assert!(execution.context().unwrap_err().is_illegal_state());

        execution.begin(Dependency::reading(&v)).unwrap();
        assert!(matches!(
            execution.begin(Dependency::reading(&v)),
            Err(CoreError::IllegalState {
                expected: ExecutionState::Standby,
                actual: ExecutionState::Running,
            })
        ));
        assert_eq!(lock.readers(), 1);

        execution.commit().unwrap();
        assert!(execution.commit().unwrap_err().is_illegal_state());
        assert!(execution.abort().unwrap_err().is_illegal_state());
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn try_begin_rolls_back_on_contention() {
        let (a, lock_a) = locked_variable(1);
        let (b, lock_b) = locked_variable(2);
        lock_b.write_lock().lock().unwrap();

        let mut execution = TransactionExecution::new();
        let dependency = Dependency::builder().read(&a).write(&b).build();
        assert!(execution.try_begin(dependency.clone()).unwrap().is_none());

        assert_eq!(execution.state(), ExecutionState::Standby);
        assert!(execution.held_locks().is_empty());
        assert_eq!(lock_a.readers(), 0);

        lock_b.write_lock().unlock().unwrap();
        assert!(execution.try_begin(dependency).unwrap().is_some());
        assert_eq!(execution.held_locks().len(), 2);
        execution.abort().unwrap();
    }

    #[test]
    fn failed_commit_releases_locks() {
        let lock = Arc::new(InMemoryLock::new());
        let driver = Driver::new(lock.clone(), Arc::new(BrokenPersistence));
        let v: Variable<i64> = Variable::new("broken", driver);
        let mut execution = TransactionExecution::new();

        let context = execution.begin(Dependency::writing(&v)).unwrap();
        context.write(&v, 3).unwrap();
        let err = execution.commit().unwrap_err();

        assert!(matches!(err, CoreError::Storage(StorageError::Unavailable(_))));
        assert_eq!(execution.state(), ExecutionState::Aborted);
        assert!(!lock.is_write_locked());
        assert!(execution.held_locks().is_empty());
    }

    #[test]
    fn dropping_running_execution_releases_locks() {
        let (v, lock) = locked_variable(1);
        {
            let mut execution = TransactionExecution::new();
            execution.begin(Dependency::writing(&v)).unwrap();
            assert!(lock.is_write_locked());
        }
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn canonical_ordering_acquires_sorted() {
        let a: Variable<i64> = Variable::new("a", Driver::in_memory());
        let b: Variable<i64> = Variable::new("b", Driver::in_memory());
        let mut execution =
            TransactionExecution::with_config(Config::new().lock_ordering(LockOrdering::Canonical));

        execution
            .begin(Dependency::builder().write(&a).read(&b).build())
            .unwrap();
        assert_eq!(
            execution.held_locks(),
            vec![
                (VariableId::from("a"), LockMode::Write),
                (VariableId::from("b"), LockMode::Read),
            ]
        );
        execution.commit().unwrap();
    }
}
