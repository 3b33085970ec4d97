//! Concurrency stress runs.
//!
//! These drive many threads against one shared variable and report what
//! ended up persisted, so callers can compare it with what was expected.

use lockstep_core::{CoreResult, TransactionExecutor, Variable};
use lockstep_recipes::{Alter, InterProcessAggregator, Read, SumAggregator};
use std::panic;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Transactions (or publications) per thread.
    pub rounds: usize,
    /// Local aggregations per publication.
    pub per_round: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            rounds: 25,
            per_round: 10,
        }
    }
}

impl StressConfig {
    /// Returns the total a sum run should leave behind.
    pub fn expected_total(&self) -> i64 {
        i64::try_from(self.threads * self.rounds * self.per_round).unwrap_or(i64::MAX)
    }
}

/// Outcome of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Value persisted at the end of the run.
    pub persisted: Option<i64>,
    /// Total duration.
    pub duration: Duration,
}

/// Runs `config.threads` sum aggregators that each publish `config.rounds`
/// times into `variable`.
///
/// # Errors
///
/// Returns the first error a worker hit.
pub fn run_aggregation_stress(
    variable: &Variable<i64>,
    config: &StressConfig,
) -> CoreResult<StressResult> {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let mut aggregator = InterProcessAggregator::new(variable.clone(), SumAggregator);
            let config = config.clone();
            thread::spawn(move || -> CoreResult<()> {
                for _ in 0..config.rounds {
                    for _ in 0..config.per_round {
                        aggregator.aggregate_local(1);
                    }
                    aggregator.aggregate_remote()?;
                }
                Ok(())
            })
        })
        .collect();
    join_all(handles)?;
    finish(variable, start)
}

/// Runs `config.threads` threads that each increment `variable`
/// `config.rounds * config.per_round` times with read-modify-write
/// transactions on `executor`.
///
/// # Errors
///
/// Returns the first error a worker hit.
pub fn run_increment_stress(
    variable: &Variable<i64>,
    executor: &TransactionExecutor,
    config: &StressConfig,
) -> CoreResult<StressResult> {
    let start = Instant::now();
    let increment = |n: Option<i64>| n.unwrap_or(0) + 1;
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let variable = variable.clone();
            let executor = executor.clone();
            let transactions = config.rounds * config.per_round;
            thread::spawn(move || -> CoreResult<()> {
                let alter = Alter::new(&variable, increment);
                for _ in 0..transactions {
                    executor.execute(&alter)?;
                }
                Ok(())
            })
        })
        .collect();
    join_all(handles)?;
    finish(variable, start)
}

fn join_all(handles: Vec<thread::JoinHandle<CoreResult<()>>>) -> CoreResult<()> {
    let mut first_error = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn finish(variable: &Variable<i64>, start: Instant) -> CoreResult<StressResult> {
    let duration = start.elapsed();
    let persisted = TransactionExecutor::new().execute(&Read::new(variable))?;
    debug!(variable = %variable.id(), ?persisted, ?duration, "stress run finished");
    Ok(StressResult {
        persisted,
        duration,
    })
}
