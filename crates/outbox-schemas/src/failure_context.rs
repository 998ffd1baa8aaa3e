use chrono::{DateTime, Utc};

/// Carried to a fallback so it can distinguish *why* the primary handler's
/// retries were abandoned.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub record_id: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub failure_count: u32,
    pub last_error: String,
    /// `true` when the Retry stage stopped because `failure_count >
    /// max_retries`, as opposed to a non-retryable error.
    pub retries_exhausted: bool,
    /// `true` when `should_retry` returned `false` for the last error.
    pub non_retryable: bool,
}
