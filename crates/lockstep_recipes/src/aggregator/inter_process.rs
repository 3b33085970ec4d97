//! Local accumulation with transactional publication.

use super::Aggregator;
use lockstep_core::{CoreResult, Dependency, TransactionExecutor, Value, Variable};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;
use tracing::debug;

/// Accumulates locally and publishes into a shared variable.
///
/// `aggregate_local` never touches a lock or the backend. `aggregate_remote`
/// runs one transaction that commutes the shared variable with
/// `merge(local, persisted)` and, once committed, resets the local
/// accumulator. Any number of instances, in any number of processes, may
/// publish into the same variable.
///
/// An instance is meant for a single owner; methods that change the local
/// accumulator take `&mut self`.
///
/// # Example
///
/// ```rust
/// use lockstep_core::Variable;
/// use lockstep_recipes::aggregator::{InterProcessAggregator, SumAggregator};
///
/// let total: Variable<i64> = Variable::in_memory();
/// let mut first = InterProcessAggregator::new(total.clone(), SumAggregator);
/// let mut second = InterProcessAggregator::new(total, SumAggregator);
///
/// first.aggregate_local(2);
/// second.aggregate_local(5);
/// first.aggregate_remote().unwrap();
/// second.aggregate_remote().unwrap();
///
/// assert_eq!(first.read_remote().unwrap(), Some(7));
/// assert_eq!(*first.read_local(), 0);
/// ```
pub struct InterProcessAggregator<Aggregand, Aggregate, A> {
    variable: Variable<Aggregate>,
    aggregator: Arc<A>,
    local: Aggregate,
    executor: TransactionExecutor,
    _aggregand: PhantomData<fn(Aggregand)>,
}

impl<Aggregand, Aggregate, A> InterProcessAggregator<Aggregand, Aggregate, A>
where
    Aggregate: Value,
    A: Aggregator<Aggregand, Aggregate> + 'static,
{
    /// Creates an aggregator publishing into `variable`.
    pub fn new(variable: Variable<Aggregate>, aggregator: A) -> Self {
        Self::with_executor(variable, aggregator, TransactionExecutor::new())
    }

    /// Creates an aggregator whose transactions run on `executor`.
    pub fn with_executor(
        variable: Variable<Aggregate>,
        aggregator: A,
        executor: TransactionExecutor,
    ) -> Self {
        let local = aggregator.initial_value();
        Self {
            variable,
            aggregator: Arc::new(aggregator),
            local,
            executor,
            _aggregand: PhantomData,
        }
    }

    /// Folds `value` into the local accumulator and returns it.
    pub fn aggregate_local(&mut self, value: Aggregand) -> &Aggregate {
        let current = mem::replace(&mut self.local, self.aggregator.initial_value());
        self.local = self.aggregator.aggregate(value, current);
        &self.local
    }

    /// Returns the local accumulator.
    #[must_use]
    pub fn read_local(&self) -> &Aggregate {
        &self.local
    }

    /// Merges the local accumulator into the shared variable and resets it.
    ///
    /// Blocks until the variable's write lock is granted.
    ///
    /// # Errors
    ///
    /// Returns the transaction's error. The local accumulator is kept, so a
    /// later call publishes it again; check the shared value first if the
    /// failure happened during commit.
    pub fn aggregate_remote(&mut self) -> CoreResult<()> {
        let local = self.local.clone();
        let aggregator = Arc::clone(&self.aggregator);
        let variable = &self.variable;

        self.executor
            .execute_with(Dependency::commuting(variable), |context| {
                context.commute(variable, move |persisted: Option<Aggregate>| {
                    let persisted = persisted.unwrap_or_else(|| aggregator.initial_value());
                    aggregator.merge(local.clone(), persisted)
                })
            })?;

        debug!(variable = %self.variable.id(), "local aggregate published");
        self.local = self.aggregator.initial_value();
        Ok(())
    }

    /// Reads the shared aggregate, without the unpublished local part.
    ///
    /// Returns `None` if nothing was ever published.
    ///
    /// # Errors
    ///
    /// Returns the read transaction's error.
    pub fn read_remote(&self) -> CoreResult<Option<Aggregate>> {
        let variable = &self.variable;
        self.executor
            .execute_with(Dependency::reading(variable), |context| context.read(variable))
    }

    /// Returns the shared variable.
    #[must_use]
    pub fn variable(&self) -> &Variable<Aggregate> {
        &self.variable
    }

    /// Returns the aggregation algebra.
    #[must_use]
    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }
}

impl<Aggregand, Aggregate: fmt::Debug, A> fmt::Debug
    for InterProcessAggregator<Aggregand, Aggregate, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterProcessAggregator")
            .field("variable", &self.variable)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{SetUnionAggregator, SumAggregator};
    use std::collections::BTreeSet;

    #[test]
    fn local_accumulation_is_private() {
        let shared: Variable<i64> = Variable::in_memory();
        let mut aggregator = InterProcessAggregator::new(shared, SumAggregator);

        assert_eq!(*aggregator.aggregate_local(4), 4);
        assert_eq!(*aggregator.aggregate_local(6), 10);
        assert_eq!(*aggregator.read_local(), 10);
        assert_eq!(aggregator.read_remote().unwrap(), None);
    }

    #[test]
    fn publish_resets_local() {
        let shared: Variable<i64> = Variable::in_memory();
        let mut aggregator = InterProcessAggregator::new(shared, SumAggregator);

        aggregator.aggregate_local(3);
        aggregator.aggregate_remote().unwrap();

        assert_eq!(*aggregator.read_local(), 0);
        assert_eq!(aggregator.read_remote().unwrap(), Some(3));
    }

    #[test]
    fn publish_merges_with_existing_value() {
        let shared = Variable::in_memory_with(100_i64);
        let mut aggregator = InterProcessAggregator::new(shared, SumAggregator);

        aggregator.aggregate_local(1);
        aggregator.aggregate_remote().unwrap();
        aggregator.aggregate_local(2);
        aggregator.aggregate_remote().unwrap();

        assert_eq!(aggregator.read_remote().unwrap(), Some(103));
    }

    #[test]
    fn read_remote_is_idempotent() {
        let shared: Variable<i64> = Variable::in_memory();
        let mut aggregator = InterProcessAggregator::new(shared, SumAggregator);
        aggregator.aggregate_local(8);
        aggregator.aggregate_remote().unwrap();
        aggregator.aggregate_local(1);

        let first = aggregator.read_remote().unwrap();
        let second = aggregator.read_remote().unwrap();
        assert_eq!(first, Some(8));
        assert_eq!(first, second);
    }

    #[test]
    fn publishing_nothing_writes_initial_value() {
        let shared: Variable<BTreeSet<u8>> = Variable::in_memory();
        let mut aggregator: InterProcessAggregator<u8, _, _> =
            InterProcessAggregator::new(shared, SetUnionAggregator);

        aggregator.aggregate_remote().unwrap();
        assert_eq!(aggregator.read_remote().unwrap(), Some(BTreeSet::new()));
    }

    #[test]
    fn publish_waits_for_write_lock() {
        let shared: Variable<i64> = Variable::in_memory();
        let reader = shared.driver().lock().read_lock();
        reader.lock().unwrap();

        let mut aggregator = InterProcessAggregator::new(shared.clone(), SumAggregator);
        aggregator.aggregate_local(5);
        let publisher = std::thread::spawn(move || {
            aggregator.aggregate_remote().unwrap();
            aggregator
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(shared.driver().persistence().read().unwrap(), None);
        reader.unlock().unwrap();

        let aggregator = publisher.join().unwrap();
        assert_eq!(aggregator.read_remote().unwrap(), Some(5));
    }
}
