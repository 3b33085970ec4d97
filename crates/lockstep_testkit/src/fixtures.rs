//! Instrumented backends and variable helpers.
//!
//! [`RecordingLock`] wraps a real in-memory lock and records every
//! acquisition and release, so tests can assert on lock order and balance.
//! [`FailingPersistence`] wraps an in-memory cell and fails reads or writes
//! on demand.

use lockstep_core::{CoreResult, Value, Variable};
use lockstep_storage::{
    Driver, InMemoryLock, InMemoryPersistence, Lock, LockMode, Persistence, ReadWriteLock,
    StorageError, StorageResult,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// What happened to a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    /// `lock` or a successful `try_lock`.
    Acquired,
    /// A `try_lock` that found the lock held elsewhere.
    Contended,
    /// A successful `unlock`.
    Released,
}

/// One entry of a [`LockLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Name of the recording lock.
    pub name: String,
    /// Side of the lock.
    pub mode: LockMode,
    /// What happened.
    pub event: LockEvent,
}

/// An ordered log shared by any number of [`RecordingLock`]s.
#[derive(Debug, Clone, Default)]
pub struct LockLog(Arc<Mutex<Vec<LockRecord>>>);

impl LockLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record so far.
    pub fn records(&self) -> Vec<LockRecord> {
        self.0.lock().clone()
    }

    /// Returns the `(name, mode)` of each acquisition, in order.
    pub fn acquisitions(&self) -> Vec<(String, LockMode)> {
        self.filtered(LockEvent::Acquired)
    }

    /// Returns the `(name, mode)` of each release, in order.
    pub fn releases(&self) -> Vec<(String, LockMode)> {
        self.filtered(LockEvent::Released)
    }

    /// Forgets every record.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn filtered(&self, event: LockEvent) -> Vec<(String, LockMode)> {
        self.0
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .map(|r| (r.name.clone(), r.mode))
            .collect()
    }

    fn push(&self, name: &str, mode: LockMode, event: LockEvent) {
        self.0.lock().push(LockRecord {
            name: name.to_string(),
            mode,
            event,
        });
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquired: usize,
    released: usize,
}

#[derive(Debug)]
struct RecordingHandle {
    name: String,
    mode: LockMode,
    inner: Arc<dyn Lock>,
    log: LockLog,
    counters: Mutex<Counters>,
}

impl RecordingHandle {
    fn acquired(&self) {
        self.counters.lock().acquired += 1;
        self.log.push(&self.name, self.mode, LockEvent::Acquired);
    }

    fn held(&self) -> usize {
        let counters = self.counters.lock();
        counters.acquired - counters.released
    }
}

impl Lock for RecordingHandle {
    fn lock(&self) -> StorageResult<()> {
        self.inner.lock()?;
        self.acquired();
        Ok(())
    }

    fn try_lock(&self) -> StorageResult<bool> {
        if self.inner.try_lock()? {
            self.acquired();
            Ok(true)
        } else {
            self.log.push(&self.name, self.mode, LockEvent::Contended);
            Ok(false)
        }
    }

    fn unlock(&self) -> StorageResult<()> {
        let mut counters = self.counters.lock();
        if counters.released >= counters.acquired {
            return Err(StorageError::LockNotHeld { mode: self.mode });
        }
        self.inner.unlock()?;
        counters.released += 1;
        drop(counters);
        self.log.push(&self.name, self.mode, LockEvent::Released);
        Ok(())
    }
}

/// A real in-memory lock that counts and logs what happens to it.
///
/// Releasing a side that this lock never granted fails with
/// [`StorageError::LockNotHeld`], which makes double releases visible.
#[derive(Debug)]
pub struct RecordingLock {
    inner: InMemoryLock,
    read: Arc<RecordingHandle>,
    write: Arc<RecordingHandle>,
}

impl RecordingLock {
    /// Creates a lock named `name` with a private log.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, LockLog::new())
    }

    /// Creates a lock named `name` that records into `log`.
    pub fn with_log(name: impl Into<String>, log: LockLog) -> Self {
        let name = name.into();
        let inner = InMemoryLock::new();
        let handle = |mode| {
            Arc::new(RecordingHandle {
                name: name.clone(),
                mode,
                inner: inner.for_mode(mode),
                log: log.clone(),
                counters: Mutex::new(Counters::default()),
            })
        };
        let read = handle(LockMode::Read);
        let write = handle(LockMode::Write);
        Self { inner, read, write }
    }

    fn side(&self, mode: LockMode) -> &RecordingHandle {
        match mode {
            LockMode::Read => &self.read,
            LockMode::Write => &self.write,
        }
    }

    /// Returns how often `mode` was acquired.
    pub fn acquisitions(&self, mode: LockMode) -> usize {
        self.side(mode).counters.lock().acquired
    }

    /// Returns how often `mode` was released.
    pub fn releases(&self, mode: LockMode) -> usize {
        self.side(mode).counters.lock().released
    }

    /// Returns how many acquisitions of `mode` are outstanding.
    pub fn held(&self, mode: LockMode) -> usize {
        self.side(mode).held()
    }

    /// Checks that every acquisition has been released.
    pub fn is_balanced(&self) -> bool {
        self.held(LockMode::Read) == 0 && self.held(LockMode::Write) == 0
    }

    /// Returns the log this lock records into.
    pub fn log(&self) -> &LockLog {
        &self.read.log
    }

    /// Returns the wrapped lock.
    pub fn inner(&self) -> &InMemoryLock {
        &self.inner
    }
}

impl ReadWriteLock for RecordingLock {
    fn read_lock(&self) -> Arc<dyn Lock> {
        self.read.clone()
    }

    fn write_lock(&self) -> Arc<dyn Lock> {
        self.write.clone()
    }
}

/// An in-memory cell whose reads and writes can be made to fail.
pub struct FailingPersistence<T> {
    inner: InMemoryPersistence<T>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl<T> FailingPersistence<T> {
    /// Creates an empty cell that does not fail yet.
    pub fn new() -> Self {
        Self::from_inner(InMemoryPersistence::new())
    }

    /// Creates a cell holding `value` that does not fail yet.
    pub fn with_value(value: T) -> Self {
        Self::from_inner(InMemoryPersistence::with_value(value))
    }

    fn from_inner(inner: InMemoryPersistence<T>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes subsequent reads fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of writes that went through.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<T> Default for FailingPersistence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FailingPersistence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingPersistence")
            .field("fail_reads", &self.fail_reads.load(Ordering::SeqCst))
            .field("fail_writes", &self.fail_writes.load(Ordering::SeqCst))
            .field("writes", &self.writes())
            .finish()
    }
}

impl<T: Clone + Send + Sync> Persistence<T> for FailingPersistence<T> {
    fn read(&self) -> StorageResult<Option<T>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected read failure"));
        }
        self.inner.read()
    }

    fn write(&self, value: T) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected write failure"));
        }
        self.inner.write(value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A variable backed by a [`RecordingLock`] and an in-memory cell.
pub fn recorded_variable<T: Value>(name: &str, log: &LockLog) -> (Variable<T>, Arc<RecordingLock>) {
    let lock = Arc::new(RecordingLock::with_log(name, log.clone()));
    let driver = Driver::new(lock.clone(), Arc::new(InMemoryPersistence::new()));
    (Variable::new(name, driver), lock)
}

/// A variable backed by a [`RecordingLock`] and a [`FailingPersistence`].
pub fn failing_variable<T: Value>(
    name: &str,
    log: &LockLog,
) -> (Variable<T>, Arc<RecordingLock>, Arc<FailingPersistence<T>>) {
    let lock = Arc::new(RecordingLock::with_log(name, log.clone()));
    let persistence = Arc::new(FailingPersistence::new());
    let driver = Driver::new(lock.clone(), persistence.clone());
    (Variable::new(name, driver), lock, persistence)
}

/// A file backend directory that is removed on drop.
pub struct TempBackend {
    dir: TempDir,
}

impl TempBackend {
    /// Creates an empty backend directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Returns the backend directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens variable `name` in this backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub fn variable<T>(&self, name: &str) -> CoreResult<Variable<T>>
    where
        T: Value + Serialize + DeserializeOwned,
    {
        Variable::file(self.path(), name)
    }
}

impl fmt::Debug for TempBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempBackend")
            .field("path", &self.path())
            .finish()
    }
}
