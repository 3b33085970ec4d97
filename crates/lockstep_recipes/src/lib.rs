//! # Lockstep Recipes
//!
//! Higher-level building blocks on top of `lockstep_core`.
//!
//! - [`aggregator`]: mergeable aggregates that many processes accumulate
//!   locally and publish into one shared variable
//! - [`transaction`]: one-variable [`Read`], [`Write`] and [`Alter`]
//!   transactions
//!
//! ## Example
//!
//! ```rust
//! use lockstep_core::{TransactionExecutor, Variable};
//! use lockstep_recipes::{Alter, Read};
//!
//! let visits: Variable<u64> = Variable::in_memory();
//! let executor = TransactionExecutor::new();
//!
//! executor
//!     .execute(&Alter::new(&visits, |n: Option<u64>| n.unwrap_or(0) + 1))
//!     .unwrap();
//! assert_eq!(executor.execute(&Read::new(&visits)).unwrap(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod transaction;

pub use aggregator::{
    Aggregator, CountAggregator, InterProcessAggregator, InterProcessKeyedAggregator,
    KeyedAggregator, MaxAggregator, SetUnionAggregator, SumAggregator,
};
pub use transaction::{Alter, Read, Write};
