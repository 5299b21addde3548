use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::JobError;

/// Parameters of one run. A later run (including a resume) may use different
/// values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub concurrency: usize,
    pub requests_per_second: f64,
    pub timeout_seconds: f64,
    pub retries: u32,
    pub resume: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            concurrency: 50,
            requests_per_second: 100.0,
            timeout_seconds: 10.0,
            retries: 1,
            resume: false,
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.concurrency == 0 {
            return Err(JobError::InvalidConfig("concurrency must be > 0".into()));
        }
        if !self.requests_per_second.is_finite()
            || self.requests_per_second <= 0.0
            || Duration::try_from_secs_f64(1.0 / self.requests_per_second).is_err()
        {
            return Err(JobError::InvalidConfig(format!(
                "requests_per_second must be a positive number, got {}",
                self.requests_per_second
            )));
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 || Duration::try_from_secs_f64(self.timeout_seconds).is_err() {
            return Err(JobError::InvalidConfig(format!(
                "timeout_seconds must be a positive number, got {}",
                self.timeout_seconds
            )));
        }
        Ok(())
    }

    /// Per-attempt timeout. Only meaningful on a validated config.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::from_secs(10))
    }
}
