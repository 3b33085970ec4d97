//! # Lockstep Storage
//!
//! Lock and persistence contracts for lockstep variables, with reference
//! implementations.
//!
//! A variable's state lives entirely in its backend. The transaction layer in
//! `lockstep_core` only orchestrates two capabilities per variable:
//!
//! - a [`ReadWriteLock`], whose read and write sides are [`Lock`]s with
//!   explicit `lock`/`try_lock`/`unlock`
//! - a [`Persistence`] cell with `read`/`write`
//!
//! bundled as a [`Driver`].
//!
//! ## Available Backends
//!
//! - [`InMemoryLock`] + [`InMemoryPersistence`] - threads of one process
//! - [`FileLock`] + [`FilePersistence`] - processes sharing a directory
//!
//! ## Example
//!
//! ```rust
//! use lockstep_storage::Driver;
//!
//! let driver = Driver::in_memory_with(10_i64);
//! let write = driver.lock().write_lock();
//! write.lock().unwrap();
//! let current = driver.persistence().read().unwrap().unwrap_or(0);
//! driver.persistence().write(current + 1).unwrap();
//! write.unlock().unwrap();
//! assert_eq!(driver.persistence().read().unwrap(), Some(11));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod file;
mod lock;
mod memory;
mod persistence;

pub use driver::Driver;
pub use error::{StorageError, StorageResult};
pub use file::{FileLayout, FileLock, FileLockHandle, FilePersistence};
pub use lock::{Lock, LockMode, ReadWriteLock};
pub use memory::{InMemoryLock, InMemoryLockHandle, InMemoryPersistence};
pub use persistence::Persistence;
