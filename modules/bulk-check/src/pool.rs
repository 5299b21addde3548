//! Bounded-concurrency executor for one job's work list.

use reach_core::ratelimiter::RateLimiter;
use results_sqlite::Outcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::checker::Checker;
use crate::retry::RetryPolicy;
use crate::state::JobState;
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// URLs handed to a worker.
    pub dispatched: usize,
    /// Workers that ran to completion.
    pub completed: usize,
    /// Dispatch ended early because of cancellation.
    pub cancelled: bool,
}

/// Everything one worker needs; cloned into each spawned task.
#[derive(Clone)]
struct Worker {
    checker: Arc<dyn Checker>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    timeout: Duration,
    state: Arc<JobState>,
    store: Arc<dyn ResultStore>,
}

pub struct WorkerPool {
    concurrency: usize,
    worker: Worker,
}

impl WorkerPool {
    pub fn new(
        concurrency: usize,
        limiter: RateLimiter,
        retry: RetryPolicy,
        timeout: Duration,
        checker: Arc<dyn Checker>,
        state: Arc<JobState>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        WorkerPool {
            concurrency: concurrency.max(1),
            worker: Worker { checker, limiter, retry, timeout, state, store },
        }
    }

    /// Check every URL with at most `concurrency` in flight.
    ///
    /// `cancel` is consulted before each dispatch; once it fires no new URL is
    /// started, but checks already running finish (retries included) before
    /// this returns.
    pub async fn run(&self, urls: Vec<String>, cancel: CancellationToken) -> PoolReport {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut report = PoolReport::default();

        for url in urls {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            while let Some(res) = tasks.try_join_next() {
                reap(res, &mut report);
            }
            let worker = self.worker.clone();
            tasks.spawn(async move {
                worker.check(url).await;
                drop(permit);
            });
            report.dispatched += 1;
        }

        if report.cancelled {
            debug!(in_flight = tasks.len(), "dispatch cancelled, draining");
        }
        while let Some(res) = tasks.join_next().await {
            reap(res, &mut report);
        }
        report
    }
}

fn reap(res: Result<(), JoinError>, report: &mut PoolReport) {
    match res {
        Ok(()) => report.completed += 1,
        Err(e) if e.is_panic() => error!(error = %e, "check task panicked"),
        Err(e) => warn!(error = %e, "check task aborted"),
    }
}

impl Worker {
    async fn check(&self, url: String) {
        let probe = self.retry.run(self.checker.as_ref(), &self.limiter, &url, self.timeout).await;
        let outcome = Outcome::new(url, probe.status, probe.error);
        self.state.record(&outcome);
        if outcome.is_error() {
            debug!(url = %outcome.url, status = outcome.status_code, error = ?outcome.error, "url failed");
        }

        let url = outcome.url.clone();
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.record(&outcome)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(url = %url, error = %e, "failed to record outcome"),
            Err(e) => error!(url = %url, error = %e, "store task failed"),
        }
    }
}
