//! Ready-made single-variable transactions.

use lockstep_core::{Context, CoreResult, Dependency, Transaction, Value, Variable};
use std::fmt;

/// Reads a variable under its read lock.
#[derive(Debug, Clone)]
pub struct Read<T> {
    variable: Variable<T>,
}

impl<T> Read<T> {
    /// Creates a read of `variable`.
    pub fn new(variable: &Variable<T>) -> Self {
        Self {
            variable: variable.clone(),
        }
    }
}

impl<T: Value> Transaction for Read<T> {
    type Output = Option<T>;

    fn dependency(&self) -> Dependency {
        Dependency::reading(&self.variable)
    }

    fn run(&self, context: &mut Context) -> CoreResult<Option<T>> {
        context.read(&self.variable)
    }
}

/// Replaces the value of a variable under its write lock.
#[derive(Debug, Clone)]
pub struct Write<T> {
    variable: Variable<T>,
    value: T,
}

impl<T> Write<T> {
    /// Creates a write of `value` to `variable`.
    pub fn new(variable: &Variable<T>, value: T) -> Self {
        Self {
            variable: variable.clone(),
            value,
        }
    }
}

impl<T: Value> Transaction for Write<T> {
    type Output = ();

    fn dependency(&self) -> Dependency {
        Dependency::writing(&self.variable)
    }

    fn run(&self, context: &mut Context) -> CoreResult<()> {
        context.write(&self.variable, self.value.clone())
    }
}

/// Read-modify-write of a variable under its write lock.
///
/// Returns the new value.
pub struct Alter<T, F> {
    variable: Variable<T>,
    alter: F,
}

impl<T, F> Alter<T, F>
where
    F: Fn(Option<T>) -> T,
{
    /// Creates an alteration of `variable` by `alter`.
    pub fn new(variable: &Variable<T>, alter: F) -> Self {
        Self {
            variable: variable.clone(),
            alter,
        }
    }
}

impl<T, F> Transaction for Alter<T, F>
where
    T: Value,
    F: Fn(Option<T>) -> T,
{
    type Output = T;

    fn dependency(&self) -> Dependency {
        Dependency::writing(&self.variable)
    }

    fn run(&self, context: &mut Context) -> CoreResult<T> {
        let next = (self.alter)(context.read(&self.variable)?);
        context.write(&self.variable, next.clone())?;
        Ok(next)
    }
}

impl<T, F> fmt::Debug for Alter<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alter")
            .field("variable", &self.variable)
            .finish_non_exhaustive()
    }
}
