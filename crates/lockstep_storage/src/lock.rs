//! Lock contracts.

use crate::error::StorageResult;
use std::fmt;
use std::sync::Arc;

/// The two modes a variable can be locked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockMode {
    /// Shared access; any number of holders, no writer.
    Read,
    /// Exclusive access; a single holder.
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// One side of a variable's lock.
///
/// Unlike `std` guards, acquisition and release are separate calls: a
/// transaction acquires many locks in `begin` and releases them in
/// `commit`/`abort`, so the borrow checker cannot scope them.
///
/// # Invariants
///
/// - `lock` blocks until granted; there is no timeout.
/// - `try_lock` never blocks; `Ok(false)` means the lock is held elsewhere.
/// - Every successful `lock`/`try_lock` is paired with exactly one `unlock`.
pub trait Lock: Send + Sync + fmt::Debug {
    /// Acquires the lock, waiting as long as necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while waiting.
    fn lock(&self) -> StorageResult<()>;

    /// Attempts to acquire the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; contention is `Ok(false)`.
    fn try_lock(&self) -> StorageResult<bool>;

    /// Releases one acquisition of the lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockNotHeld`](crate::StorageError::LockNotHeld)
    /// if there is nothing to release, or a backend error.
    fn unlock(&self) -> StorageResult<()>;
}

/// A shared/exclusive lock pair guarding one variable.
pub trait ReadWriteLock: Send + Sync + fmt::Debug {
    /// The shared side.
    fn read_lock(&self) -> Arc<dyn Lock>;

    /// The exclusive side.
    fn write_lock(&self) -> Arc<dyn Lock>;

    /// Returns the side for `mode`.
    fn for_mode(&self, mode: LockMode) -> Arc<dyn Lock> {
        match mode {
            LockMode::Read => self.read_lock(),
            LockMode::Write => self.write_lock(),
        }
    }
}
