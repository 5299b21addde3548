//! Bulk URL reachability checking: a rate-limited, bounded-concurrency job
//! engine with retries, live progress and resume from the results store.

pub mod checker;
pub mod config;
pub mod controller;
pub mod error;
pub mod pool;
pub mod retry;
pub mod state;
pub mod store;

pub use checker::{Checker, HttpChecker, Probe, USER_AGENTS};
pub use config::JobConfig;
pub use controller::{JobController, RunHandle, RunSummary};
pub use error::JobError;
pub use pool::{PoolReport, WorkerPool};
pub use retry::RetryPolicy;
pub use state::{JobPhase, JobState, JobStatus, RECENT_ERRORS_CAP};
pub use store::{ResultStore, SqliteStore};

pub use reach_core::UrlList;
pub use results_sqlite::Outcome;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}
