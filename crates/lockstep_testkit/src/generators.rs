//! Property-based test generators using proptest.

use lockstep_core::Access;
use lockstep_storage::LockMode;
use proptest::prelude::*;
use std::collections::HashMap;

/// Strategy for variable names as a file backend would see them.
pub fn variable_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}(/[a-z0-9_]{1,8}){0,2}"
}

/// Strategy for lock modes.
pub fn lock_mode_strategy() -> impl Strategy<Value = LockMode> {
    prop_oneof![Just(LockMode::Read), Just(LockMode::Write)]
}

/// Strategy for per-publisher batches of small signed amounts.
///
/// Each inner vector is what one aggregator accumulates before publishing.
pub fn batches_strategy(publishers: usize) -> impl Strategy<Value = Vec<Vec<i64>>> {
    prop::collection::vec(prop::collection::vec(-1_000_i64..1_000, 0..16), 1..=publishers.max(1))
}

/// Strategy for per-publisher keyed contributions over a small key space,
/// so that publishers overlap on keys.
pub fn keyed_batches_strategy(
    publishers: usize,
) -> impl Strategy<Value = Vec<HashMap<String, i64>>> {
    let key = prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(str::to_string);
    prop::collection::vec(
        prop::collection::hash_map(key, -100_i64..100, 0..5),
        1..=publishers.max(1),
    )
}

/// Strategy for how a transaction declares one variable.
pub fn access_strategy() -> impl Strategy<Value = Access> {
    prop_oneof![Just(Access::Read), Just(Access::Write), Just(Access::Commute)]
}

/// Strategy for a non-empty set of declared roles per variable.
///
/// A variable can be declared in several roles at once.
pub fn roles_strategy(variables: usize) -> impl Strategy<Value = Vec<Vec<Access>>> {
    prop::collection::vec(prop::collection::vec(access_strategy(), 1..=3), variables)
}
