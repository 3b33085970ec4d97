//! The lock + persistence pair behind a variable.

use crate::error::StorageResult;
use crate::file::{FileLayout, FileLock, FilePersistence};
use crate::lock::ReadWriteLock;
use crate::memory::{InMemoryLock, InMemoryPersistence};
use crate::persistence::Persistence;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A backend's handle on one variable: how to lock it and where it lives.
///
/// Cloning a driver is cheap and yields a handle on the same state.
pub struct Driver<T> {
    lock: Arc<dyn ReadWriteLock>,
    persistence: Arc<dyn Persistence<T>>,
    /// Value file of a file-backed driver.
    location: Option<PathBuf>,
}

impl<T> Driver<T> {
    /// Pairs a lock with a persistence cell.
    pub fn new(lock: Arc<dyn ReadWriteLock>, persistence: Arc<dyn Persistence<T>>) -> Self {
        Self {
            lock,
            persistence,
            location: None,
        }
    }

    /// Returns where the value is stored, for drivers opened on a file.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Checks if both drivers lock and store the same state.
    ///
    /// That holds for clones of one driver, and for file drivers opened on
    /// the same directory and name.
    #[must_use]
    pub fn shares_state_with(&self, other: &Self) -> bool {
        let same_cells = same_allocation(&self.lock, &other.lock)
            && same_allocation(&self.persistence, &other.persistence);
        same_cells
            || matches!(
                (&self.location, &other.location),
                (Some(a), Some(b)) if a == b
            )
    }

    /// Returns the variable's lock.
    #[must_use]
    pub fn lock(&self) -> &Arc<dyn ReadWriteLock> {
        &self.lock
    }

    /// Returns the variable's persistence cell.
    #[must_use]
    pub fn persistence(&self) -> &Arc<dyn Persistence<T>> {
        &self.persistence
    }
}

impl<T: Clone + Send + Sync + 'static> Driver<T> {
    /// Creates a process-local driver with no initial value.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryLock::new()),
            Arc::new(InMemoryPersistence::new()),
        )
    }

    /// Creates a process-local driver holding `value`.
    #[must_use]
    pub fn in_memory_with(value: T) -> Self {
        Self::new(
            Arc::new(InMemoryLock::new()),
            Arc::new(InMemoryPersistence::with_value(value)),
        )
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Driver<T> {
    /// Creates a driver for variable `name` stored under `dir`.
    ///
    /// The directory is created if needed. Drivers opened on the same
    /// directory and name, in any process, share lock and value.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn file(dir: &Path, name: &str) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        let dir = std::fs::canonicalize(dir)?;
        let layout = FileLayout::new(&dir, name);
        Ok(Self {
            lock: Arc::new(FileLock::new(layout.lock_path)),
            persistence: Arc::new(FilePersistence::new(layout.value_path.clone())),
            location: Some(layout.value_path),
        })
    }
}

fn same_allocation<A: ?Sized>(a: &Arc<A>, b: &Arc<A>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl<T> Clone for Driver<T> {
    fn clone(&self) -> Self {
        Self {
            lock: Arc::clone(&self.lock),
            persistence: Arc::clone(&self.persistence),
            location: self.location.clone(),
        }
    }
}

impl<T> fmt::Debug for Driver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("lock", &self.lock)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clones_share_state() {
        let driver = Driver::in_memory_with(1_u32);
        let clone = driver.clone();

        clone.persistence().write(2).unwrap();
        assert_eq!(driver.persistence().read().unwrap(), Some(2));

        assert!(clone.lock().write_lock().try_lock().unwrap());
        assert!(!driver.lock().read_lock().try_lock().unwrap());
    }

    #[test]
    fn file_drivers_with_same_name_share_state() {
        let dir = tempdir().unwrap();
        let first: Driver<i64> = Driver::file(dir.path(), "total").unwrap();
        let second: Driver<i64> = Driver::file(dir.path(), "total").unwrap();
        let other: Driver<i64> = Driver::file(dir.path(), "other").unwrap();

        first.persistence().write(5).unwrap();
        assert_eq!(second.persistence().read().unwrap(), Some(5));
        assert_eq!(other.persistence().read().unwrap(), None);
    }

    #[test]
    fn state_identity_follows_backing_cells() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let a: Driver<i64> = Driver::file(first.path(), "total").unwrap();
        let reopened: Driver<i64> = Driver::file(&first.path().join("."), "total").unwrap();
        let elsewhere: Driver<i64> = Driver::file(second.path(), "total").unwrap();

        assert!(a.shares_state_with(&reopened));
        assert!(!a.shares_state_with(&elsewhere));

        let memory: Driver<i64> = Driver::in_memory();
        assert!(memory.shares_state_with(&memory.clone()));
        assert!(!memory.shares_state_with(&Driver::in_memory()));
        assert_eq!(memory.location(), None);
    }

    #[test]
    fn file_driver_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let _driver: Driver<i64> = Driver::file(&nested, "x").unwrap();
        assert!(nested.is_dir());
    }
}
