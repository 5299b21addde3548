//! Orchestrates one job run at a time: Idle -> Running -> (Stopping) -> Idle.

use anyhow::Context;
use reach_core::ratelimiter::RateLimiter;
use reach_core::UrlList;
use results_sqlite::RunMeta;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checker::{Checker, HttpChecker};
use crate::config::JobConfig;
use crate::error::JobError;
use crate::pool::WorkerPool;
use crate::retry::RetryPolicy;
use crate::state::{JobState, JobStatus};
use crate::store::ResultStore;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// URLs dispatched by this run (excludes ones skipped on resume).
    pub dispatched: usize,
    /// Cumulative checked count at the end of the run.
    pub checked: usize,
    pub errors: usize,
    pub stopped: bool,
    pub elapsed: Duration,
}

/// Handle to a run started in the background.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    handle: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the pool to drain.
    pub async fn wait(self) -> anyhow::Result<RunSummary> {
        self.handle.await.context("job task failed")
    }
}

pub struct JobController {
    state: Arc<JobState>,
    store: Arc<dyn ResultStore>,
    checker: Arc<dyn Checker>,
    urls: RwLock<Arc<Vec<String>>>,
    /// Token of the current (or last) run. Also serializes start against stop.
    cancel: Mutex<CancellationToken>,
}

impl JobController {
    pub fn new(store: Arc<dyn ResultStore>, checker: Arc<dyn Checker>) -> Self {
        Self::with_state(store, checker, Arc::new(JobState::new()))
    }

    pub fn with_state(store: Arc<dyn ResultStore>, checker: Arc<dyn Checker>, state: Arc<JobState>) -> Self {
        JobController {
            state,
            store,
            checker,
            urls: RwLock::new(Arc::new(Vec::new())),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Controller probing real URLs over HTTP(S).
    pub fn http(store: Arc<dyn ResultStore>) -> anyhow::Result<Self> {
        Ok(Self::new(store, Arc::new(HttpChecker::new()?)))
    }

    pub fn state(&self) -> Arc<JobState> {
        self.state.clone()
    }

    fn cancel_slot(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_urls(&self) -> Arc<Vec<String>> {
        self.urls.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the work list. Rejected while a job is running.
    pub fn load_urls(&self, urls: UrlList) -> Result<usize, JobError> {
        let _slot = self.cancel_slot();
        if self.state.is_running() {
            return Err(JobError::AlreadyRunning);
        }
        let urls = urls.into_vec();
        let n = urls.len();
        *self.urls.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(urls);
        self.state.reset_for_urls(n);
        info!(count = n, "urls loaded");
        Ok(n)
    }

    pub fn url_count(&self) -> usize {
        self.current_urls().len()
    }

    /// Start a run in the background.
    ///
    /// Checked in order: a job already running (conflict), an invalid config,
    /// no URLs loaded. None of these rejections touch the state. If the
    /// returned future is dropped before the run is spawned, the controller
    /// goes back to Idle.
    pub async fn start(&self, config: JobConfig) -> Result<RunHandle, JobError> {
        if self.state.is_running() {
            return Err(JobError::AlreadyRunning);
        }
        config.validate()?;
        let urls = self.current_urls();
        if urls.is_empty() {
            return Err(JobError::NoUrls);
        }
        let (cancel, idle) = {
            let mut slot = self.cancel_slot();
            if !self.state.try_begin() {
                return Err(JobError::AlreadyRunning);
            }
            *slot = CancellationToken::new();
            (slot.clone(), FinishOnDrop(self.state.clone()))
        };

        let work = self.prepare(&config, &urls).await.map_err(JobError::Store)?;

        let run_id = Uuid::now_v7();
        self.record_run_start(run_id, &config).await;
        info!(
            %run_id,
            resume = config.resume,
            pending = work.len(),
            total = urls.len(),
            concurrency = config.concurrency,
            rps = config.requests_per_second,
            "job started"
        );

        let pool = WorkerPool::new(
            config.concurrency,
            RateLimiter::new(config.requests_per_second),
            RetryPolicy::new(config.retries),
            config.timeout(),
            self.checker.clone(),
            self.state.clone(),
            self.store.clone(),
        );
        let state = self.state.clone();
        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            // Whatever happens to this task, the controller must end up Idle.
            let _idle = idle;
            let started = Instant::now();
            let report = pool.run(work, cancel.clone()).await;
            let stopped = report.cancelled || cancel.is_cancelled();
            let status = state.snapshot();

            let (checked, errors) = (status.checked, status.errors);
            match tokio::task::spawn_blocking(move || store.finish_run(&run_id, checked, errors, stopped)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(%run_id, error = %e, "failed to record run end"),
                Err(e) => error!(%run_id, error = %e, "store task failed"),
            }

            let summary = RunSummary {
                run_id,
                dispatched: report.dispatched,
                checked,
                errors,
                stopped,
                elapsed: started.elapsed(),
            };
            info!(
                %run_id,
                dispatched = summary.dispatched,
                checked = summary.checked,
                errors = summary.errors,
                stopped,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "job finished"
            );
            summary
        });
        Ok(RunHandle { run_id, handle })
    }

    /// Build this run's work list and reset or seed the counters.
    async fn prepare(&self, config: &JobConfig, urls: &Arc<Vec<String>>) -> anyhow::Result<Vec<String>> {
        let store = self.store.clone();
        if !config.resume {
            tokio::task::spawn_blocking(move || store.clear()).await??;
            self.state.reset_counters();
            return Ok(urls.to_vec());
        }

        let done = tokio::task::spawn_blocking(move || store.checked_urls()).await??;
        self.state.seed_checked(done.len());
        let work: Vec<String> = urls.iter().filter(|u| !done.contains(u.as_str())).cloned().collect();
        info!(already_checked = done.len(), remaining = work.len(), "resuming");
        Ok(work)
    }

    async fn record_run_start(&self, run_id: Uuid, config: &JobConfig) {
        let meta = RunMeta {
            run_id,
            started_at: crate::now_rfc3339(),
            tool_version: reach_core::version().to_string(),
            config_json: serde_json::to_string(config).unwrap_or_default(),
            resumed: config.resume,
        };
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.begin_run(&meta)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%run_id, error = %e, "failed to record run start"),
            Err(e) => warn!(%run_id, error = %e, "store task failed"),
        }
    }

    /// Ask the running job to stop dispatching. Returns immediately; poll
    /// [`status`](Self::status) until `running` is false to observe the drain.
    /// Idempotent, and a no-op when idle.
    pub fn stop(&self) {
        let slot = self.cancel_slot();
        if self.state.mark_stopping() {
            info!("stop requested, draining in-flight checks");
        }
        slot.cancel();
    }

    pub fn status(&self) -> JobStatus {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Write all recorded outcomes as CSV. Returns the number of rows.
    pub fn export_csv(&self, out: &mut dyn Write) -> anyhow::Result<usize> {
        self.store.export_csv(out)
    }
}

/// Returns the state to Idle when dropped, whether the start was abandoned
/// before spawning or the run task ended.
struct FinishOnDrop(Arc<JobState>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}
