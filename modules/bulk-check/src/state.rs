//! Live progress of the current job, shared by every worker and read by
//! status queries.

use results_sqlite::Outcome;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

pub const RECENT_ERRORS_CAP: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    /// Stop requested; in-flight checks are draining.
    Stopping,
}

#[derive(Debug, Default)]
struct Inner {
    phase: JobPhase,
    total: usize,
    checked: usize,
    error_count: usize,
    recent_errors: VecDeque<String>,
    start_time: Option<OffsetDateTime>,
    started: Option<Instant>,
    finished: Option<Instant>,
}

/// Point-in-time copy of [`JobState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub phase: JobPhase,
    pub total: usize,
    pub checked: usize,
    pub errors: usize,
    pub recent_errors: Vec<String>,
    pub start_time: Option<String>,
    pub elapsed_secs: f64,
    pub rate_per_sec: f64,
}

#[derive(Debug, Default)]
pub struct JobState {
    inner: Mutex<Inner>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay meaningful even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New URL list ingested: everything but the phase starts over.
    pub fn reset_for_urls(&self, total: usize) {
        let mut s = self.lock();
        s.total = total;
        s.checked = 0;
        s.error_count = 0;
        s.recent_errors.clear();
    }

    /// Idle -> Running. Returns false if a job is already active.
    pub fn try_begin(&self) -> bool {
        let mut s = self.lock();
        if s.phase != JobPhase::Idle {
            return false;
        }
        s.phase = JobPhase::Running;
        s.start_time = Some(OffsetDateTime::now_utc());
        s.started = Some(Instant::now());
        s.finished = None;
        true
    }

    pub fn reset_counters(&self) {
        let mut s = self.lock();
        s.checked = 0;
        s.error_count = 0;
        s.recent_errors.clear();
    }

    /// Resume: count outcomes already in the store as checked. The error
    /// count is left as is.
    pub fn seed_checked(&self, already_checked: usize) {
        self.lock().checked = already_checked;
    }

    /// Running -> Stopping. No-op (returns false) in any other phase.
    pub fn mark_stopping(&self) -> bool {
        let mut s = self.lock();
        if s.phase == JobPhase::Running {
            s.phase = JobPhase::Stopping;
            true
        } else {
            false
        }
    }

    pub fn finish(&self) {
        let mut s = self.lock();
        s.phase = JobPhase::Idle;
        s.finished = Some(Instant::now());
    }

    /// Account for one finished URL.
    pub fn record(&self, outcome: &Outcome) {
        let line = outcome.is_error().then(|| format_error_line(outcome));
        let mut s = self.lock();
        s.checked += 1;
        if let Some(line) = line {
            s.error_count += 1;
            s.recent_errors.push_back(line);
            while s.recent_errors.len() > RECENT_ERRORS_CAP {
                s.recent_errors.pop_front();
            }
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() != JobPhase::Idle
    }

    pub fn snapshot(&self) -> JobStatus {
        let s = self.lock();
        let elapsed_secs = match (s.started, s.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).as_secs_f64(),
            (Some(start), None) => start.elapsed().as_secs_f64(),
            _ => 0.0,
        };
        let rate_per_sec = if elapsed_secs > 0.0 { s.checked as f64 / elapsed_secs } else { 0.0 };
        JobStatus {
            running: s.phase != JobPhase::Idle,
            phase: s.phase,
            total: s.total,
            checked: s.checked,
            errors: s.error_count,
            recent_errors: s.recent_errors.iter().cloned().collect(),
            start_time: s.start_time.and_then(|t| t.format(&Rfc3339).ok()),
            elapsed_secs,
            rate_per_sec,
        }
    }
}

/// `[HH:MM:SS] url -> status (error)`
fn format_error_line(outcome: &Outcome) -> String {
    let clock = outcome
        .timestamp
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    format!(
        "[{}] {} -> {} ({})",
        clock,
        outcome.url,
        outcome.status_code,
        outcome.error.as_deref().unwrap_or("None"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(url: &str) -> Outcome {
        Outcome::new(url, 0, Some("connection refused".into()))
    }

    #[test]
    fn begin_is_exclusive() {
        let st = JobState::new();
        assert!(st.try_begin());
        assert!(!st.try_begin());
        assert_eq!(st.phase(), JobPhase::Running);
        assert!(st.mark_stopping());
        assert!(!st.try_begin());
        st.finish();
        assert!(st.try_begin());
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let st = JobState::new();
        assert!(!st.mark_stopping());
        assert_eq!(st.phase(), JobPhase::Idle);
    }

    #[test]
    fn record_counts_errors_only_for_failures() {
        let st = JobState::new();
        st.reset_for_urls(4);
        st.record(&Outcome::new("https://a.com", 200, None));
        st.record(&Outcome::new("https://b.com", 302, None));
        st.record(&Outcome::new("https://c.com", 404, Some("Not Found".into())));
        st.record(&failed("https://d.com"));
        let snap = st.snapshot();
        assert_eq!((snap.total, snap.checked, snap.errors), (4, 4, 2));
        assert_eq!(snap.recent_errors.len(), 2);
        assert!(snap.recent_errors[0].ends_with("] https://c.com -> 404 (Not Found)"));
        assert!(snap.recent_errors[1].ends_with("] https://d.com -> 0 (connection refused)"));
    }

    #[test]
    fn error_line_format() {
        let o = Outcome::new("https://x.com", 500, None);
        let line = format_error_line(&o);
        assert_eq!(line.len(), "[00:00:00] https://x.com -> 500 (None)".len());
        assert!(line.starts_with('['));
        assert_eq!(&line[3..4], ":");
        assert!(line.ends_with("] https://x.com -> 500 (None)"));
    }

    #[test]
    fn recent_errors_keep_latest_fifty() {
        let st = JobState::new();
        for i in 0..60 {
            st.record(&failed(&format!("https://e{i}.com")));
        }
        let snap = st.snapshot();
        assert_eq!(snap.errors, 60);
        assert_eq!(snap.recent_errors.len(), RECENT_ERRORS_CAP);
        assert!(snap.recent_errors[0].contains("https://e10.com ->"));
        assert!(snap.recent_errors[49].contains("https://e59.com ->"));
    }

    #[test]
    fn seeding_keeps_error_count() {
        let st = JobState::new();
        st.reset_for_urls(10);
        st.record(&failed("https://a.com"));
        st.seed_checked(7);
        let snap = st.snapshot();
        assert_eq!((snap.checked, snap.errors), (7, 1));
    }

    #[test]
    fn reset_for_urls_clears_progress() {
        let st = JobState::new();
        st.record(&failed("https://a.com"));
        st.reset_for_urls(3);
        let snap = st.snapshot();
        assert_eq!((snap.total, snap.checked, snap.errors), (3, 0, 0));
        assert!(snap.recent_errors.is_empty());
        assert!(!snap.running);
        assert!(snap.start_time.is_none());
    }

    #[test]
    fn snapshot_reports_start_time_once_begun() {
        let st = JobState::new();
        st.try_begin();
        let snap = st.snapshot();
        assert!(snap.running);
        assert_eq!(snap.phase, JobPhase::Running);
        assert!(snap.start_time.is_some());
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["phase"], "running");
    }
}
