//! # Lockstep Core
//!
//! Declared-dependency transactions over lockable shared variables.
//!
//! This crate provides:
//! - [`Variable`] handles over a backend [`Driver`](lockstep_storage::Driver)
//! - [`Dependency`] declarations of what a transaction reads, writes, and
//!   commutes
//! - [`Context`] staging of reads, writes, and [`Commutation`]s
//! - the [`TransactionExecution`] state machine (blocking and non-blocking
//!   begin, commit, abort)
//! - the [`TransactionExecutor`] for one-call transactions
//!
//! ## Example
//!
//! ```rust
//! use lockstep_core::{Dependency, TransactionExecution, Variable};
//!
//! let total: Variable<i64> = Variable::in_memory();
//!
//! let mut execution = TransactionExecution::new();
//! if let Some(context) = execution.try_begin(Dependency::commuting(&total)).unwrap() {
//!     context.commute(&total, |t: Option<i64>| t.unwrap_or(0) + 5).unwrap();
//!     execution.commit().unwrap();
//! }
//! assert_eq!(total.driver().persistence().read().unwrap(), Some(5));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod commutation;
mod config;
mod context;
mod dependency;
mod error;
mod transaction;
mod types;
mod variable;

pub use commutation::Commutation;
pub use config::{Config, LockOrdering};
pub use context::{Accessor, Context};
pub use dependency::{Dependency, DependencyBuilder};
pub use error::{CoreError, CoreResult};
pub use transaction::{Transaction, TransactionExecution, TransactionExecutor};
pub use types::{Access, ExecutionState, VariableId};
pub use variable::{Value, Variable};

pub use lockstep_storage::{Driver, LockMode, StorageError};
