//! Typed handles on shared state.

use crate::commutation;
use crate::context::Accessor;
use crate::error::{CoreError, CoreResult};
use crate::types::VariableId;
use lockstep_storage::{Driver, Lock, LockMode, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Values that can be held by a [`Variable`].
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

/// A typed handle on one piece of shared state.
///
/// The handle itself is stateless: the value and its lock live in the
/// [`Driver`]. Clones refer to the same state.
pub struct Variable<T> {
    id: VariableId,
    driver: Driver<T>,
}

impl<T> Variable<T> {
    /// Wraps a backend driver under `id`.
    pub fn new(id: impl Into<VariableId>, driver: Driver<T>) -> Self {
        Self {
            id: id.into(),
            driver,
        }
    }

    /// Returns the variable's identity.
    #[must_use]
    pub fn id(&self) -> &VariableId {
        &self.id
    }

    /// Returns the backend driver.
    #[must_use]
    pub fn driver(&self) -> &Driver<T> {
        &self.driver
    }
}

impl<T: Value> Variable<T> {
    /// Creates an anonymous process-local variable with no value.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(VariableId::random(), Driver::in_memory())
    }

    /// Creates an anonymous process-local variable holding `value`.
    #[must_use]
    pub fn in_memory_with(value: T) -> Self {
        Self::new(VariableId::random(), Driver::in_memory_with(value))
    }
}

impl<T: Value + Serialize + DeserializeOwned> Variable<T> {
    /// Opens variable `name` in the file backend rooted at `dir`.
    ///
    /// The id is `file:<canonical dir>/<name>`, so equal names under
    /// different directories stay distinct.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend directory cannot be created.
    pub fn file(dir: &Path, name: &str) -> CoreResult<Self> {
        let driver = Driver::file(dir, name)?;
        let dir = std::fs::canonicalize(dir).map_err(StorageError::from)?;
        Ok(Self::new(format!("file:{}/{name}", dir.display()), driver))
    }
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            driver: self.driver.clone(),
        }
    }
}

impl<T> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable").field("id", &self.id).finish()
    }
}

/// Type-erased staged state for one variable inside a context.
pub(crate) type AnyAccessor = Box<dyn Any + Send + Sync>;

/// A variable with its value type erased, so that one dependency can mix
/// variables of different types.
pub(crate) trait AnyVariable: Send + Sync + fmt::Debug {
    fn id(&self) -> &VariableId;

    fn as_any(&self) -> &dyn Any;

    /// Checks if `other` is a handle on the same state, with the same
    /// value type.
    fn shares_state_with(&self, other: &dyn AnyVariable) -> bool;

    fn lock_for(&self, mode: LockMode) -> Arc<dyn Lock>;

    /// Builds an accessor holding the value currently persisted.
    fn load(&self) -> CoreResult<AnyAccessor>;

    /// Builds an accessor with no materialized value.
    fn unloaded(&self) -> AnyAccessor;

    /// Persists the accessor's staged write, if any.
    fn persist(&self, accessor: &AnyAccessor) -> CoreResult<()>;

    /// Folds the accessor's queued commutations over the persisted value
    /// and persists the result.
    fn commute(&self, accessor: &mut AnyAccessor) -> CoreResult<()>;
}

impl<T: Value> Variable<T> {
    fn downcast<'a>(&self, accessor: &'a AnyAccessor) -> CoreResult<&'a Accessor<T>> {
        accessor
            .downcast_ref::<Accessor<T>>()
            .ok_or_else(|| CoreError::type_mismatch(&self.id))
    }
}

impl<T: Value> AnyVariable for Variable<T> {
    fn id(&self) -> &VariableId {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn shares_state_with(&self, other: &dyn AnyVariable) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.driver.shares_state_with(&other.driver))
    }

    fn lock_for(&self, mode: LockMode) -> Arc<dyn Lock> {
        self.driver.lock().for_mode(mode)
    }

    fn load(&self) -> CoreResult<AnyAccessor> {
        let value = self.driver.persistence().read()?;
        Ok(Box::new(Accessor::<T>::new(value)))
    }

    fn unloaded(&self) -> AnyAccessor {
        Box::new(Accessor::<T>::new(None))
    }

    fn persist(&self, accessor: &AnyAccessor) -> CoreResult<()> {
        if let Some(value) = self.downcast(accessor)?.staged() {
            self.driver.persistence().write(value.clone())?;
        }
        Ok(())
    }

    fn commute(&self, accessor: &mut AnyAccessor) -> CoreResult<()> {
        let queue = accessor
            .downcast_mut::<Accessor<T>>()
            .ok_or_else(|| CoreError::type_mismatch(&self.id))?
            .take_commutations();
        if queue.is_empty() {
            return Ok(());
        }
        let current = self.driver.persistence().read()?;
        if let Some(value) = commutation::fold(current, &queue) {
            self.driver.persistence().write(value)?;
        }
        Ok(())
    }
}
