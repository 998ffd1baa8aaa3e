use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of bytes retained from a handler/fallback error message.
///
/// Longer messages are truncated at a UTF-8-safe boundary before being
/// stored in [`Record::failure_reason`].
pub const MAX_FAILURE_REASON_LEN: usize = 2_000;

/// Number of partitions the cluster coordinates over. Fixed by design;
/// the partition count is not reconfigurable at runtime.
pub const TOTAL_PARTITIONS: u16 = 256;

/// Lifecycle state of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    New,
    Completed,
    Failed,
}

/// A durable intent to invoke a single handler with a specific payload.
///
/// Mutation is only ever valid through the transition methods below — they
/// are the only way to keep `status`/`completed_at`/`failure_count`
/// consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub key: String,
    pub payload: Value,
    pub payload_type: String,
    pub context: BTreeMap<String, String>,
    pub handler_id: String,
    pub partition: u16,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub failure_reason: Option<String>,
    pub next_retry_at: DateTime<Utc>,
}

impl Record {
    /// Construct a brand-new `NEW` record. `partition` must already be
    /// `hash(key) mod TOTAL_PARTITIONS` — callers go through
    /// `outbox_core::partition_of` rather than compute it inline.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        key: String,
        payload: Value,
        payload_type: String,
        context: BTreeMap<String, String>,
        handler_id: String,
        partition: u16,
        now: DateTime<Utc>,
    ) -> Self {
        assert!(partition < TOTAL_PARTITIONS, "partition out of range");
        Self {
            id,
            key,
            payload,
            payload_type,
            context,
            handler_id,
            partition,
            status: RecordStatus::New,
            created_at: now,
            completed_at: None,
            failure_count: 0,
            failure_reason: None,
            next_retry_at: now,
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == RecordStatus::New && self.next_retry_at <= now
    }

    /// Transition to `COMPLETED`. Idempotent: calling it twice keeps the
    /// `completed_at` from the first call.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        if self.status == RecordStatus::Completed {
            return;
        }
        self.status = RecordStatus::Completed;
        self.completed_at = Some(now);
    }

    pub fn mark_failed(&mut self) {
        self.status = RecordStatus::Failed;
    }

    /// Record a failed attempt: bump `failure_count` and store a truncated
    /// reason. Does not touch `status` or `next_retry_at` — the processor
    /// chain's Retry stage decides those.
    pub fn record_failure(&mut self, reason: &str) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.failure_reason = Some(truncate_reason(reason));
    }

    pub fn schedule_retry(&mut self, next_retry_at: DateTime<Utc>) {
        self.next_retry_at = next_retry_at;
    }
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_FAILURE_REASON_LEN {
        return reason.to_string();
    }
    let mut end = MAX_FAILURE_REASON_LEN;
    while end > 0 && !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}
