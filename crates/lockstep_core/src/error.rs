//! Error types for lockstep core.

use crate::types::{Access, ExecutionState, VariableId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in transaction processing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Lock or persistence backend error.
    #[error("storage error: {0}")]
    Storage(#[from] lockstep_storage::StorageError),

    /// A lifecycle call was made outside its required state.
    #[error("transaction execution state should be {expected} but is {actual}")]
    IllegalState {
        /// The state the call requires.
        expected: ExecutionState,
        /// The state the execution was in.
        actual: ExecutionState,
    },

    /// The context was asked for an access the dependency did not declare.
    #[error("variable {variable} is not declared for {access}")]
    UndeclaredVariable {
        /// The variable accessed.
        variable: VariableId,
        /// The attempted access.
        access: Access,
    },

    /// The same variable id was used with two different value types.
    #[error("variable {variable} used with a different value type")]
    TypeMismatch {
        /// The variable accessed.
        variable: VariableId,
    },

    /// One variable id was declared for two different pieces of state.
    #[error("variable {variable} is declared with two different backends")]
    ConflictingVariable {
        /// The id shared by both declarations.
        variable: VariableId,
    },

    /// A retrying execution gave up on lock contention.
    #[error("locks still contended after {attempts} attempts")]
    Contention {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl CoreError {
    /// Creates an illegal state error.
    pub fn illegal_state(expected: ExecutionState, actual: ExecutionState) -> Self {
        Self::IllegalState { expected, actual }
    }

    /// Creates an undeclared variable error.
    pub fn undeclared(variable: &VariableId, access: Access) -> Self {
        Self::UndeclaredVariable {
            variable: variable.clone(),
            access,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(variable: &VariableId) -> Self {
        Self::TypeMismatch {
            variable: variable.clone(),
        }
    }

    /// Creates a conflicting variable error.
    pub fn conflicting_variable(variable: &VariableId) -> Self {
        Self::ConflictingVariable {
            variable: variable.clone(),
        }
    }

    /// Checks if this is an illegal state error.
    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_state_message_names_both_states() {
        let err = CoreError::illegal_state(ExecutionState::Running, ExecutionState::Standby);
        assert_eq!(
            err.to_string(),
            "transaction execution state should be RUNNING but is STANDBY"
        );
        assert!(err.is_illegal_state());
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = lockstep_storage::StorageError::unavailable("gone").into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(!err.is_illegal_state());
    }
}
