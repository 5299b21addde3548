use reach_core::ratelimiter::RateLimiter;
use std::time::Duration;
use tracing::debug;

use crate::checker::{Checker, Probe};

/// Bounded per-URL retry loop.
///
/// Only attempts that got no response (status 0) are retried. Any HTTP
/// response is final, including 4xx/5xx: a server that answers 404 will answer
/// 404 again, and retrying it only burns rate budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        RetryPolicy { retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Run up to `retries + 1` attempts, each gated by `limiter`. Returns the
    /// last attempt executed.
    pub async fn run<C: Checker + ?Sized>(
        &self,
        checker: &C,
        limiter: &RateLimiter,
        url: &str,
        timeout: Duration,
    ) -> Probe {
        let attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            limiter.acquire().await;
            let probe = checker.check(url, timeout).await;
            if probe.got_response() || attempt >= attempts {
                debug!(url, attempt, status = probe.status, "check finished");
                return probe;
            }
            debug!(url, attempt, error = probe.error.as_deref().unwrap_or(""), "attempt failed, retrying");
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back a fixed script; once exhausted keeps failing with the attempt number.
    struct Scripted {
        script: Mutex<VecDeque<Probe>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<Probe>) -> Self {
            Scripted { script: Mutex::new(script.into()), calls: AtomicU32::new(0) }
        }
        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Checker for Scripted {
        async fn check(&self, _url: &str, _timeout: Duration) -> Probe {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Probe::failed(format!("failure on attempt {n}")))
        }
    }

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn succeeds_after_two_failures() {
        let checker = Scripted::new(vec![
            Probe::failed("reset"),
            Probe::failed("reset"),
            Probe::response(200, Some("OK")),
        ]);
        let p = RetryPolicy::new(2).run(&checker, &RateLimiter::new(1000.0), "https://a.com", T).await;
        assert_eq!(p, Probe { status: 200, error: None });
        assert_eq!(checker.calls(), 3);
    }

    #[tokio::test]
    async fn always_failing_reports_last_failure() {
        let checker = Scripted::new(vec![]);
        let p = RetryPolicy::new(2).run(&checker, &RateLimiter::new(1000.0), "https://a.com", T).await;
        assert_eq!(p.status, 0);
        assert_eq!(p.error.as_deref(), Some("failure on attempt 3"));
        assert_eq!(checker.calls(), 3);
    }

    #[tokio::test]
    async fn http_error_is_not_retried() {
        let checker = Scripted::new(vec![
            Probe::response(404, Some("Not Found")),
            Probe::response(200, Some("OK")),
        ]);
        let p = RetryPolicy::new(3).run(&checker, &RateLimiter::new(1000.0), "https://a.com", T).await;
        assert_eq!(p.status, 404);
        assert_eq!(checker.calls(), 1);
    }

    #[tokio::test]
    async fn failure_then_server_error_stops_at_response() {
        let checker = Scripted::new(vec![Probe::failed("reset"), Probe::response(500, None)]);
        let p = RetryPolicy::new(5).run(&checker, &RateLimiter::new(1000.0), "https://a.com", T).await;
        assert_eq!(p, Probe { status: 500, error: Some("HTTP 500".into()) });
        assert_eq!(checker.calls(), 2);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let checker = Scripted::new(vec![]);
        let p = RetryPolicy::new(0).run(&checker, &RateLimiter::new(1000.0), "https://a.com", T).await;
        assert_eq!(p.error.as_deref(), Some("failure on attempt 1"));
        assert_eq!(checker.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_takes_a_token() {
        let checker = Scripted::new(vec![]);
        let limiter = RateLimiter::new(1.0);
        let start = tokio::time::Instant::now();
        RetryPolicy::new(2).run(&checker, &limiter, "https://a.com", T).await;
        // First token from the burst, then one per second.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
