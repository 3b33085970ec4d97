//! # Lockstep Testkit
//!
//! Test utilities for lockstep.
//!
//! This crate provides:
//! - Instrumented locks and failure-injecting persistence
//! - Property-based test generators using proptest
//! - Concurrency stress runs
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust
//! use lockstep_core::{Dependency, TransactionExecution};
//! use lockstep_testkit::prelude::*;
//!
//! let log = LockLog::new();
//! let (counter, lock) = recorded_variable::<i64>("counter", &log);
//!
//! let mut execution = TransactionExecution::new();
//! execution.begin(Dependency::writing(&counter)).unwrap();
//! execution.abort().unwrap();
//! assert!(lock.is_balanced());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::{capture_warnings, init_test_logging};
pub use stress::*;
