//! One-call transaction helpers.

use crate::config::Config;
use crate::context::Context;
use crate::dependency::Dependency;
use crate::error::{CoreError, CoreResult};
use crate::transaction::execution::TransactionExecution;
use std::thread;
use tracing::{debug, warn};

/// A unit of work with a declared dependency.
///
/// `run` may be invoked more than once by a retrying executor, each time in
/// a fresh context; side effects belong in the context.
pub trait Transaction {
    /// What the transaction returns.
    type Output;

    /// The variables the transaction touches.
    fn dependency(&self) -> Dependency;

    /// Reads and stages work against `context`.
    ///
    /// # Errors
    ///
    /// Any error aborts the transaction and is returned to the caller.
    fn run(&self, context: &mut Context) -> CoreResult<Self::Output>;
}

/// Runs transactions from begin to commit in one call.
///
/// # Example
///
/// ```rust
/// use lockstep_core::{Dependency, TransactionExecutor, Variable};
///
/// let hits: Variable<u64> = Variable::in_memory();
/// let executor = TransactionExecutor::new();
///
/// executor
///     .execute_with(Dependency::commuting(&hits), |context| {
///         context.commute(&hits, |n: Option<u64>| n.unwrap_or(0) + 1)
///     })
///     .unwrap();
///
/// let seen = executor
///     .execute_with(Dependency::reading(&hits), |context| context.read(&hits))
///     .unwrap();
/// assert_eq!(seen, Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionExecutor {
    config: Config,
}

impl TransactionExecutor {
    /// Creates an executor with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with `config`.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a fresh execution configured like this executor.
    #[must_use]
    pub fn execution(&self) -> TransactionExecution {
        TransactionExecution::with_config(self.config.clone())
    }

    /// Runs `transaction`, waiting for its locks as long as necessary.
    ///
    /// # Errors
    ///
    /// Returns the transaction's own error (after aborting) or a backend
    /// error.
    pub fn execute<X>(&self, transaction: &X) -> CoreResult<X::Output>
    where
        X: Transaction + ?Sized,
    {
        self.execute_with(transaction.dependency(), |context| transaction.run(context))
    }

    /// Runs `transaction` if its locks are free right now.
    ///
    /// Returns `Ok(None)` on contention.
    ///
    /// # Errors
    ///
    /// Returns the transaction's own error (after aborting) or a backend
    /// error.
    pub fn try_execute<X>(&self, transaction: &X) -> CoreResult<Option<X::Output>>
    where
        X: Transaction + ?Sized,
    {
        self.try_execute_with(transaction.dependency(), |context| transaction.run(context))
    }

    /// Runs `transaction` with non-blocking lock acquisition, backing off
    /// between attempts as configured.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Contention`] once `max_attempts` attempts have
    /// met contention, or the first other error.
    pub fn execute_with_retry<X>(&self, transaction: &X) -> CoreResult<X::Output>
    where
        X: Transaction + ?Sized,
    {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(output) = self.try_execute(transaction)? {
                return Ok(output);
            }
            if attempt < attempts {
                let pause = self.config.backoff_for(attempt);
                debug!(attempt, ?pause, "transaction contended, backing off");
                thread::sleep(pause);
            }
        }
        Err(CoreError::Contention { attempts })
    }

    /// Runs `body` against a context for `dependency`, waiting for locks as
    /// long as necessary.
    ///
    /// # Errors
    ///
    /// Returns `body`'s error (after aborting) or a backend error.
    pub fn execute_with<R, F>(&self, dependency: Dependency, body: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Context) -> CoreResult<R>,
    {
        let mut execution = self.execution();
        let context = execution.begin(dependency)?;
        let output = body(context);
        finish(execution, output)
    }

    /// Runs `body` against a context for `dependency` if its locks are free
    /// right now. Returns `Ok(None)` on contention without calling `body`.
    ///
    /// # Errors
    ///
    /// Returns `body`'s error (after aborting) or a backend error.
    pub fn try_execute_with<R, F>(&self, dependency: Dependency, body: F) -> CoreResult<Option<R>>
    where
        F: FnOnce(&mut Context) -> CoreResult<R>,
    {
        let mut execution = self.execution();
        let output = match execution.try_begin(dependency)? {
            Some(context) => body(context),
            None => return Ok(None),
        };
        finish(execution, output).map(Some)
    }
}

fn finish<R>(mut execution: TransactionExecution, output: CoreResult<R>) -> CoreResult<R> {
    match output {
        Ok(output) => {
            execution.commit()?;
            Ok(output)
        }
        Err(e) => {
            if let Err(abort_error) = execution.abort() {
                warn!(error = %abort_error, "abort after failed transaction body");
            }
            Err(e)
        }
    }
}
