//! Core type definitions for lockstep.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a variable, assigned by its backend.
///
/// Two handles with the same id refer to the same shared state. Ids order
/// lexicographically, which gives every process the same total order over
/// variables.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(Arc<str>);

impl VariableId {
    /// Creates an id from a backend-assigned name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Creates a fresh id for an anonymous process-local variable.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("mem:{}", Uuid::new_v4()))
    }

    /// Returns the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariableId({})", self.0)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariableId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for VariableId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Lifecycle state of a [`TransactionExecution`](crate::TransactionExecution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Created, no locks held.
    Standby,
    /// Locks held, context live.
    Running,
    /// Writes and commutations applied, locks released.
    Committed,
    /// Locks released without applying anything, or after a failed commit.
    Aborted,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standby => "STANDBY",
            Self::Running => "RUNNING",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// The ways a transaction may touch a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Observe the value.
    Read,
    /// Replace the value at commit.
    Write,
    /// Fold a deferred update into the value at commit.
    Commute,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Commute => f.write_str("commute"),
        }
    }
}
