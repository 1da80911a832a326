//! Bounded worker pool for independent per-item operations.
//!
//! Unlike the pipeline driver this is not fail-fast: every item runs, and
//! each failure (including a panic) is kept next to the item it belongs to.

use crate::error::{BatchError, BatchResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

#[derive(Debug)]
pub struct ItemOutcome<I, T> {
    pub item: I,
    pub result: BatchResult<T>,
}

#[derive(Debug)]
pub struct BatchReport<I, T> {
    /// One outcome per input, in input order.
    pub outcomes: Vec<ItemOutcome<I, T>>,
    pub workers: usize,
    pub elapsed: Duration,
}

impl<I, T> BatchReport<I, T> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&I, &BatchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.item, e)))
    }

    /// Values of the successful items, in input order.
    pub fn into_values(self) -> Vec<T> {
        self.outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .collect()
    }
}

/// Applies `op` to every item on a pool of at most `max_workers` threads.
///
/// Only pool construction can fail the call as a whole.
pub fn process_all<I, T, F>(
    items: Vec<I>,
    op: F,
    max_workers: usize,
) -> BatchResult<BatchReport<I, T>>
where
    I: Send,
    T: Send,
    F: Fn(&I) -> BatchResult<T> + Sync,
{
    let workers = max_workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("recon-batch-{i}"))
        .build()
        .map_err(|e| BatchError::Pool(e.to_string()))?;

    tracing::debug!(items = items.len(), workers, "batch started");
    let start = Instant::now();

    let outcomes: Vec<ItemOutcome<I, T>> = pool.install(|| {
        items
            .into_par_iter()
            .map(|item| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| op(&item)))
                    .unwrap_or_else(|payload| Err(BatchError::Panicked(panic_message(&payload))));
                ItemOutcome { item, result }
            })
            .collect()
    });

    let report = BatchReport {
        outcomes,
        workers,
        elapsed: start.elapsed(),
    };
    tracing::info!(
        succeeded = report.success_count(),
        failed = report.failure_count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "batch finished"
    );
    Ok(report)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
