//! Ready-made aggregators.

use super::Aggregator;
use std::collections::BTreeSet;
use std::ops::Add;

/// Sums aggregands of any additive type.
///
/// Overflow behaves as `+` does for `T`: primitive integers panic in debug
/// builds, inside the commit that publishes the sum. Aggregate into
/// [`std::num::Wrapping`] to wrap instead.
///
/// ```rust
/// use lockstep_recipes::{Aggregator, SumAggregator};
/// use std::num::Wrapping;
///
/// let total = SumAggregator.merge(Wrapping(i64::MAX), Wrapping(1));
/// assert_eq!(total, Wrapping(i64::MIN));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SumAggregator;

impl<T> Aggregator<T, T> for SumAggregator
where
    T: Add<Output = T> + Default,
{
    fn initial_value(&self) -> T {
        T::default()
    }

    fn aggregate(&self, value: T, aggregate: T) -> T {
        aggregate + value
    }

    fn merge(&self, lhs: T, rhs: T) -> T {
        lhs + rhs
    }
}

/// Counts aggregands, ignoring their values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountAggregator;

impl<T> Aggregator<T, u64> for CountAggregator {
    fn initial_value(&self) -> u64 {
        0
    }

    fn aggregate(&self, _value: T, aggregate: u64) -> u64 {
        aggregate + 1
    }

    fn merge(&self, lhs: u64, rhs: u64) -> u64 {
        lhs + rhs
    }
}

/// Keeps the largest aggregand seen; `None` until one arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxAggregator;

impl<T: Ord> Aggregator<T, Option<T>> for MaxAggregator {
    fn initial_value(&self) -> Option<T> {
        None
    }

    fn aggregate(&self, value: T, aggregate: Option<T>) -> Option<T> {
        self.merge(Some(value), aggregate)
    }

    fn merge(&self, lhs: Option<T>, rhs: Option<T>) -> Option<T> {
        match (lhs, rhs) {
            (Some(l), Some(r)) => Some(l.max(r)),
            (l, r) => l.or(r),
        }
    }
}

/// Collects the distinct aggregands seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetUnionAggregator;

impl<T: Ord> Aggregator<T, BTreeSet<T>> for SetUnionAggregator {
    fn initial_value(&self) -> BTreeSet<T> {
        BTreeSet::new()
    }

    fn aggregate(&self, value: T, mut aggregate: BTreeSet<T>) -> BTreeSet<T> {
        aggregate.insert(value);
        aggregate
    }

    fn merge(&self, mut lhs: BTreeSet<T>, mut rhs: BTreeSet<T>) -> BTreeSet<T> {
        if lhs.len() < rhs.len() {
            std::mem::swap(&mut lhs, &mut rhs);
        }
        lhs.extend(rhs);
        lhs
    }
}
