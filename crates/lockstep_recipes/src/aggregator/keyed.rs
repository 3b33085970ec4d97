//! Per-key aggregation over maps.

use super::{Aggregator, InterProcessAggregator};
use lockstep_core::{CoreResult, TransactionExecutor, Value, Variable};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Lifts a scalar [`Aggregator`] to maps, applying it independently per key.
///
/// Keys missing from an aggregate start at the scalar initial value. Keys
/// present on only one side of a merge pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyedAggregator<A>(pub A);

impl<A> KeyedAggregator<A> {
    /// Wraps a scalar aggregator.
    pub const fn new(aggregator: A) -> Self {
        Self(aggregator)
    }

    /// Returns the scalar aggregator.
    pub const fn inner(&self) -> &A {
        &self.0
    }
}

impl<K, Ag, Ae, A> Aggregator<HashMap<K, Ag>, HashMap<K, Ae>> for KeyedAggregator<A>
where
    K: Eq + Hash,
    A: Aggregator<Ag, Ae>,
{
    fn initial_value(&self) -> HashMap<K, Ae> {
        HashMap::new()
    }

    fn aggregate(&self, values: HashMap<K, Ag>, mut aggregate: HashMap<K, Ae>) -> HashMap<K, Ae> {
        for (key, value) in values {
            let current = aggregate
                .remove(&key)
                .unwrap_or_else(|| self.0.initial_value());
            aggregate.insert(key, self.0.aggregate(value, current));
        }
        aggregate
    }

    fn merge(&self, mut lhs: HashMap<K, Ae>, rhs: HashMap<K, Ae>) -> HashMap<K, Ae> {
        for (key, theirs) in rhs {
            let ours = lhs.remove(&key).unwrap_or_else(|| self.0.initial_value());
            lhs.insert(key, self.0.merge(theirs, ours));
        }
        lhs
    }
}

/// An [`InterProcessAggregator`] over a shared map of per-key aggregates.
///
/// Besides the whole-map operations it offers single-key projections, which
/// are shorthands for one-entry maps.
pub struct InterProcessKeyedAggregator<K, Ag, Ae, A> {
    inner: InterProcessAggregator<HashMap<K, Ag>, HashMap<K, Ae>, KeyedAggregator<A>>,
}

impl<K, Ag, Ae, A> InterProcessKeyedAggregator<K, Ag, Ae, A>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    Ae: Value,
    A: Aggregator<Ag, Ae> + 'static,
{
    /// Creates a keyed aggregator publishing into `variable`.
    pub fn new(variable: Variable<HashMap<K, Ae>>, aggregator: A) -> Self {
        Self {
            inner: InterProcessAggregator::new(variable, KeyedAggregator(aggregator)),
        }
    }

    /// Creates a keyed aggregator whose transactions run on `executor`.
    pub fn with_executor(
        variable: Variable<HashMap<K, Ae>>,
        aggregator: A,
        executor: TransactionExecutor,
    ) -> Self {
        Self {
            inner: InterProcessAggregator::with_executor(
                variable,
                KeyedAggregator(aggregator),
                executor,
            ),
        }
    }

    /// Folds `value` into the local aggregate of `key` and returns it.
    pub fn aggregate_local(&mut self, key: K, value: Ag) -> Option<&Ae> {
        let values = HashMap::from([(key.clone(), value)]);
        self.inner.aggregate_local(values).get(&key)
    }

    /// Folds every entry of `values` into the local aggregates.
    pub fn aggregate_local_map(&mut self, values: HashMap<K, Ag>) -> &HashMap<K, Ae> {
        self.inner.aggregate_local(values)
    }

    /// Returns the local aggregate of `key`.
    #[must_use]
    pub fn read_local(&self, key: &K) -> Option<&Ae> {
        self.inner.read_local().get(key)
    }

    /// Returns every local aggregate.
    #[must_use]
    pub fn read_local_map(&self) -> &HashMap<K, Ae> {
        self.inner.read_local()
    }

    /// Merges the local aggregates into the shared map and clears them.
    ///
    /// # Errors
    ///
    /// Returns the transaction's error; local aggregates are kept.
    pub fn aggregate_remote(&mut self) -> CoreResult<()> {
        self.inner.aggregate_remote()
    }

    /// Reads the shared aggregate of `key`.
    ///
    /// Returns `None` when nothing was published or the key is absent.
    ///
    /// # Errors
    ///
    /// Returns the read transaction's error.
    pub fn read_remote(&self, key: &K) -> CoreResult<Option<Ae>> {
        Ok(self
            .inner
            .read_remote()?
            .and_then(|mut remote| remote.remove(key)))
    }

    /// Reads the whole shared map.
    ///
    /// # Errors
    ///
    /// Returns the read transaction's error.
    pub fn read_remote_map(&self) -> CoreResult<Option<HashMap<K, Ae>>> {
        self.inner.read_remote()
    }

    /// Returns the shared variable.
    #[must_use]
    pub fn variable(&self) -> &Variable<HashMap<K, Ae>> {
        self.inner.variable()
    }
}

impl<K: fmt::Debug, Ag, Ae: fmt::Debug, A> fmt::Debug for InterProcessKeyedAggregator<K, Ag, Ae, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterProcessKeyedAggregator")
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{CountAggregator, SumAggregator};
    use proptest::prelude::*;

    fn map(entries: &[(&'static str, i64)]) -> HashMap<&'static str, i64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn aggregate_defaults_missing_keys() {
        let keyed = KeyedAggregator(SumAggregator);
        let result = keyed.aggregate(map(&[("a", 2), ("b", 1)]), map(&[("a", 5)]));
        assert_eq!(result, map(&[("a", 7), ("b", 1)]));
    }

    #[test]
    fn merge_passes_through_one_sided_keys() {
        let keyed = KeyedAggregator(SumAggregator);
        let result = keyed.merge(map(&[("a", 1), ("b", 2)]), map(&[("b", 3), ("c", 4)]));
        assert_eq!(result, map(&[("a", 1), ("b", 5), ("c", 4)]));
    }

    #[test]
    fn count_per_key() {
        let keyed = KeyedAggregator(CountAggregator);
        let once = keyed.aggregate(HashMap::from([("x", ())]), HashMap::new());
        let twice = keyed.aggregate(HashMap::from([("x", ()), ("y", ())]), once);
        assert_eq!(twice, HashMap::from([("x", 2_u64), ("y", 1)]));
    }

    #[test]
    fn single_key_projections() {
        let shared: Variable<HashMap<String, i64>> = Variable::in_memory();
        let mut aggregator = InterProcessKeyedAggregator::new(shared, SumAggregator);

        assert_eq!(aggregator.aggregate_local("a".to_string(), 2), Some(&2));
        assert_eq!(aggregator.aggregate_local("a".to_string(), 3), Some(&5));
        assert_eq!(aggregator.read_local(&"a".to_string()), Some(&5));
        assert_eq!(aggregator.read_local(&"b".to_string()), None);
        assert_eq!(aggregator.read_remote(&"a".to_string()).unwrap(), None);

        aggregator.aggregate_remote().unwrap();
        assert_eq!(aggregator.read_remote(&"a".to_string()).unwrap(), Some(5));
        assert_eq!(aggregator.read_remote(&"b".to_string()).unwrap(), None);
        assert!(aggregator.read_local_map().is_empty());
    }

    #[test]
    fn map_forms() {
        let shared: Variable<HashMap<u8, i64>> = Variable::in_memory();
        let mut aggregator = InterProcessKeyedAggregator::new(shared, SumAggregator);

        aggregator.aggregate_local_map(HashMap::from([(1, 10), (2, 20)]));
        aggregator.aggregate_local_map(HashMap::from([(2, 1)]));
        assert_eq!(aggregator.read_local_map(), &HashMap::from([(1, 10), (2, 21)]));

        aggregator.aggregate_remote().unwrap();
        assert_eq!(
            aggregator.read_remote_map().unwrap(),
            Some(HashMap::from([(1, 10), (2, 21)]))
        );
    }

    fn small_map() -> impl Strategy<Value = HashMap<u8, i64>> {
        prop::collection::hash_map(0_u8..6, -100_i64..100, 0..6)
    }

    proptest! {
        #[test]
        fn keyed_merge_is_commutative(a in small_map(), b in small_map()) {
            let keyed = KeyedAggregator(SumAggregator);
            prop_assert_eq!(keyed.merge(a.clone(), b.clone()), keyed.merge(b, a));
        }

        #[test]
        fn keyed_merge_is_associative(a in small_map(), b in small_map(), c in small_map()) {
            let keyed = KeyedAggregator(SumAggregator);
            let left = keyed.merge(keyed.merge(a.clone(), b.clone()), c.clone());
            let right = keyed.merge(a, keyed.merge(b, c));
            prop_assert_eq!(left, right);
        }

        #[test]
        fn keys_do_not_interfere(a in small_map(), b in small_map(), key in 0_u8..6) {
            let keyed = KeyedAggregator(SumAggregator);
            let merged = keyed.merge(a.clone(), b.clone());
            let expected = match (a.get(&key), b.get(&key)) {
                (None, None) => None,
                (l, r) => Some(l.copied().unwrap_or(0) + r.copied().unwrap_or(0)),
            };
            prop_assert_eq!(merged.get(&key).copied(), expected);
        }
    }
}
