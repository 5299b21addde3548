use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Recorded result of checking one URL.
///
/// `status_code` is 0 when no HTTP response was obtained; `error` then holds
/// the failure reason. For responses `>= 400` it holds the reason phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub url: String,
    pub status_code: u16,
    pub error: Option<String>,
    pub timestamp: OffsetDateTime,
}

impl Outcome {
    pub fn new(url: impl Into<String>, status_code: u16, error: Option<String>) -> Self {
        Outcome { url: url.into(), status_code, error, timestamp: OffsetDateTime::now_utc() }
    }

    pub fn is_error(&self) -> bool {
        self.status_code == 0 || self.status_code >= 400
    }

    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.format(&Rfc3339).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub started_at: String,
    pub tool_version: String,
    pub config_json: String,
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub tool_version: String,
    pub config_json: String,
    pub resumed: bool,
    pub checked: i64,
    pub error_count: i64,
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: i64,
    pub errors: i64,
    pub distinct_urls: i64,
}
