//! Deferred updates applied at commit time.

/// A pure transform of a variable's persisted value.
///
/// Commutations are queued in a [`Context`](crate::Context) and applied only
/// during commit, to the value read from the backend at that moment while
/// the variable's write lock is held. `None` means the variable has never
/// been written.
///
/// Any `Fn(Option<T>) -> T` closure is a commutation; captured values act as
/// the update's parameters.
///
/// ```rust
/// use lockstep_core::Commutation;
///
/// let add = |amount: i64| move |current: Option<i64>| current.unwrap_or(0) + amount;
/// assert_eq!(add(5).commute(Some(10)), 15);
/// assert_eq!(add(5).commute(None), 5);
/// ```
pub trait Commutation<T>: Send + Sync {
    /// Returns the updated value.
    fn commute(&self, value: Option<T>) -> T;
}

impl<T, F> Commutation<T> for F
where
    F: Fn(Option<T>) -> T + Send + Sync,
{
    fn commute(&self, value: Option<T>) -> T {
        self(value)
    }
}

/// Folds `commutations` over `value` in queue order.
///
/// Returns `None` only when the queue is empty and `value` is `None`.
pub(crate) fn fold<T>(value: Option<T>, commutations: &[Box<dyn Commutation<T>>]) -> Option<T> {
    commutations
        .iter()
        .fold(value, |current, commutation| Some(commutation.commute(current)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed<T, C: Commutation<T> + 'static>(c: C) -> Box<dyn Commutation<T>> {
        Box::new(c)
    }

    #[test]
    fn fold_applies_in_queue_order() {
        let queue = vec![
            boxed(|v: Option<i64>| v.unwrap_or(0) + 3),
            boxed(|v: Option<i64>| v.unwrap_or(0) * 10),
        ];
        assert_eq!(fold(Some(1), &queue), Some(40));
    }

    #[test]
    fn empty_queue_passes_value_through() {
        let queue: Vec<Box<dyn Commutation<i64>>> = Vec::new();
        assert_eq!(fold(Some(7), &queue), Some(7));
        assert_eq!(fold(None, &queue), None);
    }
}
