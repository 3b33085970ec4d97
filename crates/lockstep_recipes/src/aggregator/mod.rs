//! Mergeable aggregation.
//!
//! An [`Aggregator`] folds inputs ("aggregands") into an aggregate and merges
//! aggregates. When `merge` is associative and commutative, partial
//! aggregates built independently in many processes can be merged into a
//! shared variable in any order and any grouping with the same result. The
//! [`InterProcessAggregator`] relies on exactly that: accumulation is local
//! and lock-free, and publishing is one commutation per call.

mod inter_process;
mod keyed;
mod stock;

pub use inter_process::InterProcessAggregator;
pub use keyed::{InterProcessKeyedAggregator, KeyedAggregator};
pub use stock::{CountAggregator, MaxAggregator, SetUnionAggregator, SumAggregator};

/// The algebra of a mergeable aggregate.
///
/// # Laws
///
/// - `merge(a, merge(b, c)) == merge(merge(a, b), c)`
/// - `merge(a, b) == merge(b, a)`
/// - `merge(initial_value(), a) == a`
/// - `aggregate(x, initial_value())` is the aggregate of `x` alone
///
/// Implementations that break these laws make published results depend on
/// the interleaving of publishers.
pub trait Aggregator<Aggregand, Aggregate>: Send + Sync {
    /// The aggregate of nothing.
    fn initial_value(&self) -> Aggregate;

    /// Folds `value` into `aggregate`.
    fn aggregate(&self, value: Aggregand, aggregate: Aggregate) -> Aggregate;

    /// Combines two aggregates.
    fn merge(&self, lhs: Aggregate, rhs: Aggregate) -> Aggregate;
}
