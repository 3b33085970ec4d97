//! Transaction configuration.

use std::time::Duration;

/// Order in which a blocking `begin` acquires a dependency's locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockOrdering {
    /// Read locks in declaration order, then write locks in declaration
    /// order. Two transactions that declare the same variables in opposite
    /// roles can deadlock.
    #[default]
    Declaration,
    /// All locks sorted by variable id, read before write for the same id.
    /// Every caller acquires in the same global order, so blocking begins
    /// cannot wait on each other in a cycle.
    Canonical,
}

/// Configuration for executing transactions.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lock acquisition order.
    pub lock_ordering: LockOrdering,

    /// Attempts made by a retrying execution before giving up.
    pub max_attempts: u32,

    /// Pause after the first failed attempt; doubles on each retry.
    pub backoff: Duration,

    /// Upper bound on the pause between attempts.
    pub max_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_ordering: LockOrdering::Declaration,
            max_attempts: 16,
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock acquisition order.
    #[must_use]
    pub const fn lock_ordering(mut self, ordering: LockOrdering) -> Self {
        self.lock_ordering = ordering;
        self
    }

    /// Sets the number of attempts for retrying executions.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial pause between attempts.
    #[must_use]
    pub const fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the upper bound on the pause between attempts.
    #[must_use]
    pub const fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Returns the pause to take after failed attempt number `attempt`
    /// (starting at 1).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.lock_ordering, LockOrdering::Declaration);
        assert_eq!(config.max_attempts, 16);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .lock_ordering(LockOrdering::Canonical)
            .max_attempts(3)
            .backoff(Duration::from_millis(5));

        assert_eq!(config.lock_ordering, LockOrdering::Canonical);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff, Duration::from_millis(5));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let config = Config::new()
            .backoff(Duration::from_millis(10))
            .max_backoff(Duration::from_millis(50));

        assert_eq!(config.backoff_for(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for(2), Duration::from_millis(20));
        assert_eq!(config.backoff_for(3), Duration::from_millis(40));
        assert_eq!(config.backoff_for(4), Duration::from_millis(50));
        assert_eq!(config.backoff_for(40), Duration::from_millis(50));
    }
}
