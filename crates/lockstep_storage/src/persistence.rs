//! Persistence contract.

/// Durable (or at least shared) storage for one variable's value.
///
/// A variable that was never written reads as `None`. Implementations do
/// not lock; callers hold the variable's [`ReadWriteLock`](crate::ReadWriteLock)
/// around any read-modify-write sequence.
pub trait Persistence<T>: Send + Sync {
    /// Reads the current value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be loaded.
    fn read(&self) -> crate::StorageResult<Option<T>>;

    /// Replaces the current value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be stored.
    fn write(&self, value: T) -> crate::StorageResult<()>;
}
