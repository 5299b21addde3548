use thiserror::Error;

/// Rejections of control requests. The job state is unchanged when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job already running")]
    AlreadyRunning,
    #[error("no URLs uploaded")]
    NoUrls,
    #[error("invalid job config: {0}")]
    InvalidConfig(String),
    #[error("results store error: {0:#}")]
    Store(anyhow::Error),
}

impl JobError {
    /// True for the "conflict" class of rejection (something else is running).
    pub fn is_conflict(&self) -> bool {
        matches!(self, JobError::AlreadyRunning)
    }
}
