//! Transaction execution.
//!
//! A transaction declares its [`Dependency`](crate::Dependency) up front,
//! holds every lock it needs for its whole lifetime, stages work in a
//! [`Context`](crate::Context), and applies it at commit:
//! - **Isolation**: a variable's write lock serializes every transaction
//!   that writes or commutes it; readers share the read lock
//! - **Atomicity per variable**: each write or commutation is applied while
//!   the variable's lock is held
//! - **No cross-variable rollback**: a commit that fails partway leaves the
//!   variables already persisted in their new state

mod execution;
mod executor;
mod locks;

pub use execution::TransactionExecution;
pub use executor::{Transaction, TransactionExecutor};
