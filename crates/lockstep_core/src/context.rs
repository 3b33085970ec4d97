//! Per-transaction staging area.

use crate::commutation::Commutation;
use crate::dependency::Dependency;
use crate::error::{CoreError, CoreResult};
use crate::types::{Access, VariableId};
use crate::variable::{AnyAccessor, AnyVariable, Value, Variable};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Staged state for one variable within a transaction.
pub struct Accessor<T> {
    /// Value persisted when the transaction was prepared.
    snapshot: Option<T>,
    /// Value to persist at commit.
    staged: Option<T>,
    /// Updates to fold in at commit, in application order.
    commutations: Vec<Box<dyn Commutation<T>>>,
}

impl<T: Value> Accessor<T> {
    pub(crate) fn new(snapshot: Option<T>) -> Self {
        Self {
            snapshot,
            staged: None,
            commutations: Vec::new(),
        }
    }

    /// Returns the value visible to the transaction: the staged write if
    /// there is one, else the value materialized at prepare time.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.staged.as_ref().or(self.snapshot.as_ref())
    }

    /// Returns the staged write.
    #[must_use]
    pub fn staged(&self) -> Option<&T> {
        self.staged.as_ref()
    }

    /// Returns the queued commutations.
    #[must_use]
    pub fn commutations(&self) -> &[Box<dyn Commutation<T>>] {
        &self.commutations
    }

    fn stage(&mut self, value: T) {
        self.staged = Some(value);
    }

    fn enqueue(&mut self, commutation: Box<dyn Commutation<T>>) {
        self.commutations.push(commutation);
    }

    pub(crate) fn take_commutations(&mut self) -> Vec<Box<dyn Commutation<T>>> {
        std::mem::take(&mut self.commutations)
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("materialized", &self.snapshot.is_some())
            .field("staged", &self.staged.is_some())
            .field("commutations", &self.commutations.len())
            .finish()
    }
}

/// The staging area of a running transaction.
///
/// Nothing here touches a backend: reads are served from values materialized
/// when the transaction began, writes and commutations are buffered until
/// commit.
pub struct Context {
    dependency: Dependency,
    accessors: HashMap<VariableId, AnyAccessor>,
}

impl Context {
    /// Materializes every read and write target of `dependency`.
    ///
    /// Commutation-only targets are not read here; commit reads them fresh.
    pub(crate) fn prepare(dependency: Dependency) -> CoreResult<Self> {
        let mut accessors = HashMap::new();
        for variable in dependency
            .read_variables()
            .iter()
            .chain(dependency.write_variables())
        {
            if !accessors.contains_key(variable.id()) {
                accessors.insert(variable.id().clone(), variable.load()?);
            }
        }
        for variable in dependency.commutation_variables() {
            accessors
                .entry(variable.id().clone())
                .or_insert_with(|| variable.unloaded());
        }
        Ok(Self {
            dependency,
            accessors,
        })
    }

    /// Returns the dependency this context was prepared for.
    #[must_use]
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// Reads `variable` as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if `variable` is not declared as a read or write, or
    /// if the declared handle under its id refers to other state.
    pub fn read<T: Value>(&self, variable: &Variable<T>) -> CoreResult<Option<T>> {
        self.check(variable, Access::Read)?;
        Ok(self.accessor(variable)?.get().cloned())
    }

    /// Stages `value` to be persisted to `variable` at commit.
    ///
    /// # Errors
    ///
    /// Returns an error if `variable` is not declared as a write.
    pub fn write<T: Value>(&mut self, variable: &Variable<T>, value: T) -> CoreResult<()> {
        self.check(variable, Access::Write)?;
        self.accessor_mut(variable)?.stage(value);
        Ok(())
    }

    /// Queues `commutation` to be applied to `variable` at commit.
    ///
    /// # Errors
    ///
    /// Returns an error if `variable` is not declared as a commutation.
    pub fn commute<T, C>(&mut self, variable: &Variable<T>, commutation: C) -> CoreResult<()>
    where
        T: Value,
        C: Commutation<T> + 'static,
    {
        self.check(variable, Access::Commute)?;
        self.accessor_mut(variable)?.enqueue(Box::new(commutation));
        Ok(())
    }

    /// Returns the staged state of `variable`.
    ///
    /// # Errors
    ///
    /// Returns an error if `variable` is not part of the dependency, or was
    /// declared with a different value type under the same id.
    pub fn accessor<T: Value>(&self, variable: &Variable<T>) -> CoreResult<&Accessor<T>> {
        self.accessors
            .get(variable.id())
            .ok_or_else(|| CoreError::undeclared(variable.id(), Access::Read))?
            .downcast_ref::<Accessor<T>>()
            .ok_or_else(|| CoreError::type_mismatch(variable.id()))
    }

    fn accessor_mut<T: Value>(&mut self, variable: &Variable<T>) -> CoreResult<&mut Accessor<T>> {
        self.accessors
            .get_mut(variable.id())
            .ok_or_else(|| CoreError::undeclared(variable.id(), Access::Write))?
            .downcast_mut::<Accessor<T>>()
            .ok_or_else(|| CoreError::type_mismatch(variable.id()))
    }

    fn check<T: Value>(&self, variable: &Variable<T>, access: Access) -> CoreResult<()> {
        let id = variable.id();
        if !self.dependency.declares(id, access) {
            return Err(CoreError::undeclared(id, access));
        }
        match self.dependency.declared(id) {
            Some(declared) if !declared.shares_state_with(variable) => {
                Err(CoreError::conflicting_variable(id))
            }
            _ => Ok(()),
        }
    }

    /// Persists staged writes, then folds queued commutations into the
    /// values persisted at this moment.
    ///
    /// Stops at the first backend failure; variables already persisted stay
    /// persisted.
    pub(crate) fn apply(&mut self) -> CoreResult<()> {
        for variable in self.dependency.write_variables() {
            let accessor = accessor_for(&self.accessors, variable)?;
            variable.persist(accessor)?;
        }
        for variable in self.dependency.commutation_variables() {
            let accessor = self
                .accessors
                .get_mut(variable.id())
                .ok_or_else(|| CoreError::undeclared(variable.id(), Access::Commute))?;
            variable.commute(accessor)?;
        }
        Ok(())
    }
}

fn accessor_for<'a>(
    accessors: &'a HashMap<VariableId, AnyAccessor>,
    variable: &Arc<dyn AnyVariable>,
) -> CoreResult<&'a AnyAccessor> {
    accessors
        .get(variable.id())
        .ok_or_else(|| CoreError::undeclared(variable.id(), Access::Write))
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("dependency", &self.dependency)
            .field("variables", &self.accessors.len())
            .finish()
    }
}
