//! Bounded teardown of every pool.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{info, warn};
use warmpool_types::{DestroyReport, ShutdownConfig};

use super::PoolRegistry;
use crate::pool::ConnectionPool;

/// Time budgets derived from the overall shutdown deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownBudget {
    pub overall: Duration,
    /// Window for concurrent graceful closes
    pub graceful: Duration,
    /// Cap on a single pool's close
    pub per_pool: Duration,
}

impl ShutdownBudget {
    pub fn new(config: &ShutdownConfig, overall: Duration) -> Self {
        let ratio = config.graceful_ratio.clamp(0.0, 1.0);
        let graceful = overall.mul_f64(ratio).min(Duration::from_millis(config.graceful_cap_ms));
        let per_pool = graceful.min(Duration::from_millis(config.per_pool_cap_ms));
        Self { overall, graceful, per_pool }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseOutcome {
    Closed,
    Failed,
    TimedOut,
}

#[derive(Debug, Default)]
struct Tally {
    closed: usize,
    failed: usize,
    timed_out: usize,
}

impl Tally {
    fn finished(&self) -> usize {
        self.closed + self.failed + self.timed_out
    }

    fn record(&mut self, outcome: CloseOutcome) {
        match outcome {
            CloseOutcome::Closed => self.closed += 1,
            CloseOutcome::Failed => self.failed += 1,
            CloseOutcome::TimedOut => self.timed_out += 1,
        }
    }
}

async fn drain(join_set: &mut JoinSet<CloseOutcome>, tally: &mut Tally) {
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => tally.record(outcome),
            Err(e) => {
                warn!(error = %e, "Pool close task failed");
                tally.record(CloseOutcome::Failed);
            },
        }
    }
}

impl PoolRegistry {
    /// Destroy every pool within `timeout`.
    ///
    /// Pools close concurrently, each bounded by the per-pool budget, during a
    /// graceful window. Whatever is still running at the overall deadline is
    /// aborted and its agents force-released. The registry is empty and
    /// uninitialized afterwards in every case.
    pub async fn destroy_all(&self, timeout: Duration) -> DestroyReport {
        let started = Instant::now();
        let deadline = started + timeout;

        let pools: Vec<ConnectionPool> = self.pools();
        self.pools.clear();
        self.initialized.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);

        let total = pools.len();
        if total == 0 {
            info!("No connection pools to destroy");
            return DestroyReport { elapsed_ms: started.elapsed().as_millis() as u64, ..DestroyReport::default() };
        }

        let budget = ShutdownBudget::new(&self.shutdown, timeout);
        info!(
            total,
            timeout_ms = timeout.as_millis() as u64,
            graceful_ms = budget.graceful.as_millis() as u64,
            per_pool_ms = budget.per_pool.as_millis() as u64,
            "Destroying all connection pools"
        );

        let mut join_set = JoinSet::new();
        for pool in pools.iter().cloned() {
            let per_pool = budget.per_pool;
            join_set.spawn(async move {
                match tokio::time::timeout(per_pool, pool.destroy()).await {
                    Ok(Ok(())) => CloseOutcome::Closed,
                    Ok(Err(e)) => {
                        warn!(account_id = %pool.account_id(), error = %e, "Pool close failed");
                        CloseOutcome::Failed
                    },
                    Err(_) => {
                        warn!(account_id = %pool.account_id(), per_pool_ms = per_pool.as_millis() as u64, "Pool close timed out");
                        CloseOutcome::TimedOut
                    },
                }
            });
        }

        let mut tally = Tally::default();
        let mut deadline_hit = false;
        if tokio::time::timeout(budget.graceful, drain(&mut join_set, &mut tally)).await.is_err() {
            warn!(
                finished = tally.finished(),
                total,
                "Graceful window elapsed, waiting for remaining closes until the deadline"
            );
            let remaining = deadline.saturating_duration_since(Instant::now());
            deadline_hit = tokio::time::timeout(remaining, drain(&mut join_set, &mut tally)).await.is_err();
        }
        join_set.abort_all();

        let unfinished = total - tally.finished();
        for pool in &pools {
            pool.force_release();
        }

        let report = DestroyReport {
            total,
            completed: tally.closed,
            errors: tally.failed + tally.timed_out,
            timeout: deadline_hit || tally.timed_out > 0,
            forced: tally.timed_out + unfinished,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if report.timeout {
            warn!(
                completed = report.completed,
                errors = report.errors,
                forced = report.forced,
                elapsed_ms = report.elapsed_ms,
                "Connection pools destroyed after timeout"
            );
        } else {
            info!(
                completed = report.completed,
                errors = report.errors,
                elapsed_ms = report.elapsed_ms,
                "All connection pools destroyed"
            );
        }
        report
    }
}
