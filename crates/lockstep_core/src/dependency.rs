//! Declared transactional intent.

use crate::config::LockOrdering;
use crate::error::{CoreError, CoreResult};
use crate::types::{Access, VariableId};
use crate::variable::{AnyVariable, Value, Variable};
use lockstep_storage::LockMode;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The variables a transaction will read, write, or commutatively update.
///
/// Each set is deduplicated by [`VariableId`]. A variable may appear in
/// several sets; it is then locked once, for write, since the write lock
/// subsumes the read lock.
///
/// Handles declared under one id must share their state. A dependency that
/// mixes different state under one id is rejected when a transaction
/// begins.
///
/// # Example
///
/// ```rust
/// use lockstep_core::{Dependency, Variable};
///
/// let source = Variable::in_memory_with(1_i64);
/// let total: Variable<i64> = Variable::in_memory();
///
/// let dependency = Dependency::builder().read(&source).commute(&total).build();
/// assert_eq!(dependency.reads().count(), 1);
/// assert_eq!(dependency.commutations().count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct Dependency {
    reads: Vec<Arc<dyn AnyVariable>>,
    writes: Vec<Arc<dyn AnyVariable>>,
    commutations: Vec<Arc<dyn AnyVariable>>,
    conflicts: Vec<VariableId>,
}

/// A lock the execution must hold for a dependency.
#[derive(Debug, Clone)]
pub(crate) struct LockRequest {
    pub(crate) variable: Arc<dyn AnyVariable>,
    pub(crate) mode: LockMode,
}

impl Dependency {
    /// Starts building a dependency.
    #[must_use]
    pub fn builder() -> DependencyBuilder {
        DependencyBuilder::default()
    }

    /// A dependency that only reads `variable`.
    #[must_use]
    pub fn reading<T: Value>(variable: &Variable<T>) -> Self {
        Self::builder().read(variable).build()
    }

    /// A dependency that only writes `variable`.
    #[must_use]
    pub fn writing<T: Value>(variable: &Variable<T>) -> Self {
        Self::builder().write(variable).build()
    }

    /// A dependency that only commutes `variable`.
    #[must_use]
    pub fn commuting<T: Value>(variable: &Variable<T>) -> Self {
        Self::builder().commute(variable).build()
    }

    /// Returns the ids of the variables read.
    pub fn reads(&self) -> impl Iterator<Item = &VariableId> {
        self.reads.iter().map(|v| v.id())
    }

    /// Returns the ids of the variables written.
    pub fn writes(&self) -> impl Iterator<Item = &VariableId> {
        self.writes.iter().map(|v| v.id())
    }

    /// Returns the ids of the variables commuted.
    pub fn commutations(&self) -> impl Iterator<Item = &VariableId> {
        self.commutations.iter().map(|v| v.id())
    }

    /// Checks if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty() && self.commutations.is_empty()
    }

    /// Checks if `id` is declared for `access`.
    ///
    /// Write targets are also readable.
    #[must_use]
    pub fn declares(&self, id: &VariableId, access: Access) -> bool {
        let contains = |set: &[Arc<dyn AnyVariable>]| set.iter().any(|v| v.id() == id);
        match access {
            Access::Read => contains(&self.reads) || contains(&self.writes),
            Access::Write => contains(&self.writes),
            Access::Commute => contains(&self.commutations),
        }
    }

    /// Returns the declared handle for `id`.
    pub(crate) fn declared(&self, id: &VariableId) -> Option<&Arc<dyn AnyVariable>> {
        self.reads
            .iter()
            .chain(&self.writes)
            .chain(&self.commutations)
            .find(|v| v.id() == id)
    }

    /// Fails if some id was declared for two different pieces of state.
    pub(crate) fn check_identities(&self) -> CoreResult<()> {
        match self.conflicts.first() {
            Some(id) => Err(CoreError::conflicting_variable(id)),
            None => Ok(()),
        }
    }

    pub(crate) fn read_variables(&self) -> &[Arc<dyn AnyVariable>] {
        &self.reads
    }

    pub(crate) fn write_variables(&self) -> &[Arc<dyn AnyVariable>] {
        &self.writes
    }

    pub(crate) fn commutation_variables(&self) -> &[Arc<dyn AnyVariable>] {
        &self.commutations
    }

    /// Lists the locks to acquire, in acquisition order.
    ///
    /// Read locks come first, for variables that are only read, then write
    /// locks for every write or commutation target.
    pub(crate) fn lock_plan(&self, ordering: LockOrdering) -> Vec<LockRequest> {
        let mut exclusive: HashSet<&VariableId> = HashSet::new();
        let mut write_requests = Vec::new();
        for variable in self.writes.iter().chain(&self.commutations) {
            if exclusive.insert(variable.id()) {
                write_requests.push(LockRequest {
                    variable: Arc::clone(variable),
                    mode: LockMode::Write,
                });
            }
        }

        let mut plan: Vec<LockRequest> = self
            .reads
            .iter()
            .filter(|v| !exclusive.contains(v.id()))
            .map(|v| LockRequest {
                variable: Arc::clone(v),
                mode: LockMode::Read,
            })
            .collect();
        plan.extend(write_requests);

        if ordering == LockOrdering::Canonical {
            plan.sort_by(|a, b| {
                a.variable
                    .id()
                    .cmp(b.variable.id())
                    .then(a.mode.cmp(&b.mode))
            });
        }
        plan
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("reads", &self.reads().collect::<Vec<_>>())
            .field("writes", &self.writes().collect::<Vec<_>>())
            .field("commutations", &self.commutations().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Dependency`].
#[derive(Default)]
pub struct DependencyBuilder {
    dependency: Dependency,
}

impl DependencyBuilder {
    /// Declares a read of `variable`.
    #[must_use]
    pub fn read<T: Value>(mut self, variable: &Variable<T>) -> Self {
        self.note_conflict(variable);
        push_unique(&mut self.dependency.reads, variable);
        self
    }

    /// Declares a write of `variable`.
    #[must_use]
    pub fn write<T: Value>(mut self, variable: &Variable<T>) -> Self {
        self.note_conflict(variable);
        push_unique(&mut self.dependency.writes, variable);
        self
    }

    /// Declares a commutation of `variable`.
    #[must_use]
    pub fn commute<T: Value>(mut self, variable: &Variable<T>) -> Self {
        self.note_conflict(variable);
        push_unique(&mut self.dependency.commutations, variable);
        self
    }

    /// Finishes the dependency.
    #[must_use]
    pub fn build(self) -> Dependency {
        self.dependency
    }

    fn note_conflict<T: Value>(&mut self, variable: &Variable<T>) {
        let clash = self
            .dependency
            .declared(variable.id())
            .is_some_and(|declared| !declared.shares_state_with(variable));
        if clash && !self.dependency.conflicts.contains(variable.id()) {
            self.dependency.conflicts.push(variable.id().clone());
        }
    }
}

fn push_unique<T: Value>(set: &mut Vec<Arc<dyn AnyVariable>>, variable: &Variable<T>) {
    if !set.iter().any(|v| v.id() == variable.id()) {
        set.push(Arc::new(variable.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_storage::Driver;
    use proptest::prelude::*;

    fn named(name: &str) -> Variable<i64> {
        Variable::new(name, Driver::in_memory())
    }

    fn plan_of(dependency: &Dependency, ordering: LockOrdering) -> Vec<(String, LockMode)> {
        dependency
            .lock_plan(ordering)
            .into_iter()
            .map(|r| (r.variable.id().to_string(), r.mode))
            .collect()
    }

    #[test]
    fn sets_are_deduplicated() {
        let a = named("a");
        let dependency = Dependency::builder().read(&a).read(&a.clone()).build();
        assert_eq!(dependency.reads().count(), 1);
    }

    #[test]
    fn same_id_on_other_state_is_a_conflict() {
        let a = named("x");
        let b = named("x");
        let dependency = Dependency::builder().write(&a).read(&b).build();

        assert!(matches!(
            dependency.check_identities(),
            Err(CoreError::ConflictingVariable { variable }) if variable.as_str() == "x"
        ));
    }

    #[test]
    fn clones_under_one_id_are_not_a_conflict() {
        let a = named("x");
        let dependency = Dependency::builder().write(&a).commute(&a.clone()).build();
        assert!(dependency.check_identities().is_ok());
    }

    #[test]
    fn declaration_plan_is_reads_then_writes() {
        let dependency = Dependency::builder()
            .write(&named("w"))
            .read(&named("r2"))
            .commute(&named("c"))
            .read(&named("r1"))
            .build();

        assert_eq!(
            plan_of(&dependency, LockOrdering::Declaration),
            vec![
                ("r2".to_string(), LockMode::Read),
                ("r1".to_string(), LockMode::Read),
                ("w".to_string(), LockMode::Write),
                ("c".to_string(), LockMode::Write),
            ]
        );
    }

    #[test]
    fn canonical_plan_sorts_by_id() {
        let dependency = Dependency::builder()
            .read(&named("b"))
            .write(&named("c"))
            .read(&named("a"))
            .build();

        assert_eq!(
            plan_of(&dependency, LockOrdering::Canonical),
            vec![
                ("a".to_string(), LockMode::Read),
                ("b".to_string(), LockMode::Read),
                ("c".to_string(), LockMode::Write),
            ]
        );
    }

    #[test]
    fn write_lock_subsumes_read_lock() {
        let v = named("v");
        let dependency = Dependency::builder().read(&v).write(&v).commute(&v).build();

        assert_eq!(
            plan_of(&dependency, LockOrdering::Declaration),
            vec![("v".to_string(), LockMode::Write)]
        );
    }

    #[test]
    fn declares_by_access() {
        let r = named("r");
        let w = named("w");
        let c = named("c");
        let dependency = Dependency::builder().read(&r).write(&w).commute(&c).build();

        assert!(dependency.declares(r.id(), Access::Read));
        assert!(!dependency.declares(r.id(), Access::Write));
        assert!(dependency.declares(w.id(), Access::Read));
        assert!(dependency.declares(w.id(), Access::Write));
        assert!(dependency.declares(c.id(), Access::Commute));
        assert!(!dependency.declares(c.id(), Access::Read));
    }

    #[test]
    fn empty_dependency() {
        assert!(Dependency::default().is_empty());
        assert!(!Dependency::reading(&named("x")).is_empty());
    }

    proptest! {
        #[test]
        fn canonical_plan_is_sorted_and_unique(
            roles in prop::collection::vec((0_usize..5, 0_u8..3), 1..12)
        ) {
            let variables: Vec<_> = (0..5).map(|i| named(&format!("v{i}"))).collect();
            let mut builder = Dependency::builder();
            for (index, role) in roles {
                let variable = &variables[index];
                builder = match role {
                    0 => builder.read(variable),
                    1 => builder.write(variable),
                    _ => builder.commute(variable),
                };
            }

            let plan = plan_of(&builder.build(), LockOrdering::Canonical);
            for pair in plan.windows(2) {
                prop_assert!(pair[0].0 < pair[1].0);
            }
        }
    }
}
