//! In-memory backend for testing and single-process coordination.

use crate::error::{StorageError, StorageResult};
use crate::lock::{Lock, LockMode, ReadWriteLock};
use crate::persistence::Persistence;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Holders {
    readers: usize,
    writer: bool,
}

impl Holders {
    fn can_grant(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => !self.writer,
            LockMode::Write => !self.writer && self.readers == 0,
        }
    }

    fn grant(&mut self, mode: LockMode) {
        match mode {
            LockMode::Read => self.readers += 1,
            LockMode::Write => self.writer = true,
        }
    }

    fn release(&mut self, mode: LockMode) -> StorageResult<()> {
        match mode {
            LockMode::Read if self.readers > 0 => self.readers -= 1,
            LockMode::Write if self.writer => self.writer = false,
            _ => return Err(StorageError::LockNotHeld { mode }),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LockState {
    holders: Mutex<Holders>,
    released: Condvar,
}

/// One side of an [`InMemoryLock`].
#[derive(Debug)]
pub struct InMemoryLockHandle {
    state: Arc<LockState>,
    mode: LockMode,
}

impl InMemoryLockHandle {
    /// Returns the mode this handle acquires.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Lock for InMemoryLockHandle {
    fn lock(&self) -> StorageResult<()> {
        let mut holders = self.state.holders.lock();
        while !holders.can_grant(self.mode) {
            self.state.released.wait(&mut holders);
        }
        holders.grant(self.mode);
        Ok(())
    }

    fn try_lock(&self) -> StorageResult<bool> {
        let mut holders = self.state.holders.lock();
        if holders.can_grant(self.mode) {
            holders.grant(self.mode);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn unlock(&self) -> StorageResult<()> {
        let mut holders = self.state.holders.lock();
        holders.release(self.mode)?;
        drop(holders);
        self.state.released.notify_all();
        Ok(())
    }
}

/// A process-local shared/exclusive lock.
///
/// Many readers or one writer. The lock is not reentrant: a thread that holds
/// the read side and asks for the write side of the same lock waits forever.
///
/// # Example
///
/// ```rust
/// use lockstep_storage::{InMemoryLock, ReadWriteLock};
///
/// let lock = InMemoryLock::new();
/// assert!(lock.read_lock().try_lock().unwrap());
/// assert!(!lock.write_lock().try_lock().unwrap());
/// lock.read_lock().unlock().unwrap();
/// assert!(lock.write_lock().try_lock().unwrap());
/// ```
#[derive(Debug)]
pub struct InMemoryLock {
    read: Arc<InMemoryLockHandle>,
    write: Arc<InMemoryLockHandle>,
}

impl InMemoryLock {
    /// Creates a new unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        let state = Arc::new(LockState::default());
        Self {
            read: Arc::new(InMemoryLockHandle {
                state: Arc::clone(&state),
                mode: LockMode::Read,
            }),
            write: Arc::new(InMemoryLockHandle {
                state,
                mode: LockMode::Write,
            }),
        }
    }

    /// Returns the number of current read holders.
    #[must_use]
    pub fn readers(&self) -> usize {
        self.read.state.holders.lock().readers
    }

    /// Checks if the write side is held.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.write.state.holders.lock().writer
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadWriteLock for InMemoryLock {
    fn read_lock(&self) -> Arc<dyn Lock> {
        self.read.clone()
    }

    fn write_lock(&self) -> Arc<dyn Lock> {
        self.write.clone()
    }
}

/// An in-memory value cell.
///
/// Suitable for:
/// - Unit and integration tests
/// - Variables shared between threads of one process
#[derive(Debug)]
pub struct InMemoryPersistence<T> {
    value: RwLock<Option<T>>,
}

impl<T> InMemoryPersistence<T> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }

    /// Creates a cell holding `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self {
            value: RwLock::new(Some(value)),
        }
    }
}

impl<T> Default for InMemoryPersistence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Persistence<T> for InMemoryPersistence<T> {
    fn read(&self) -> StorageResult<Option<T>> {
        Ok(self.value.read().clone())
    }

    fn write(&self, value: T) -> StorageResult<()> {
        *self.value.write() = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readers_share() {
        let lock = InMemoryLock::new();
        assert!(lock.read_lock().try_lock().unwrap());
        assert!(lock.read_lock().try_lock().unwrap());
        assert_eq!(lock.readers(), 2);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = InMemoryLock::new();
        assert!(lock.write_lock().try_lock().unwrap());
        assert!(!lock.read_lock().try_lock().unwrap());
        assert!(!lock.write_lock().try_lock().unwrap());
    }

    #[test]
    fn reader_excludes_writer() {
        let lock = InMemoryLock::new();
        lock.read_lock().lock().unwrap();
        assert!(!lock.write_lock().try_lock().unwrap());
        lock.read_lock().unlock().unwrap();
        assert!(lock.write_lock().try_lock().unwrap());
    }

    #[test]
    fn unlock_without_lock_fails() {
        let lock = InMemoryLock::new();
        let result = lock.write_lock().unlock();
        assert!(matches!(
            result,
            Err(StorageError::LockNotHeld {
                mode: LockMode::Write
            })
        ));
        assert!(lock.read_lock().unlock().is_err());
    }

    #[test]
    fn blocked_writer_wakes_on_release() {
        let lock = Arc::new(InMemoryLock::new());
        lock.read_lock().lock().unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.write_lock().lock().unwrap();
                lock.is_write_locked()
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!lock.is_write_locked());
        lock.read_lock().unlock().unwrap();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn persistence_starts_empty() {
        let cell: InMemoryPersistence<i64> = InMemoryPersistence::new();
        assert_eq!(cell.read().unwrap(), None);
    }

    #[test]
    fn persistence_write_replaces_value() {
        let cell = InMemoryPersistence::with_value(1_i64);
        cell.write(7).unwrap();
        assert_eq!(cell.read().unwrap(), Some(7));
    }
}
