//! Token bucket shared by every worker of a job.
//!
//! Capacity and refill rate are both `requests_per_sec`, so a fresh limiter
//! allows a burst of that many acquisitions and then settles at the rate.
//! Waiters are not served in FIFO order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    rate: f64,
    bucket: Arc<Mutex<Bucket>>,
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self { RateLimiter { rate: self.rate, bucket: self.bucket.clone() } }
}

impl RateLimiter {
    /// Non-positive or non-finite rates fall back to one request per second.
    pub fn new(requests_per_sec: f64) -> Self {
        let rate = if requests_per_sec.is_finite() && requests_per_sec > 0.0 { requests_per_sec } else { 1.0 };
        let bucket = Bucket { tokens: rate, last_refill: Instant::now() };
        RateLimiter { rate, bucket: Arc::new(Mutex::new(bucket)) }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Wait until a token is available and consume it.
    ///
    /// The bucket lock is held across the wait, which is what serializes
    /// concurrent callers onto the refill schedule.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.rate);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            // A vanishingly small rate can need a wait no Duration can hold.
            let wait = Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.rate).unwrap_or(Duration::MAX);
            tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
            tokio::time::sleep(wait).await;
            // The token earned while sleeping is the one handed out here.
            bucket.tokens = 0.0;
            bucket.last_refill = Instant::now();
        } else {
            bucket.tokens -= 1.0;
        }
    }
}
