use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepositoryError;
use crate::instance::{Instance, InstanceStatus};
use crate::partition::PartitionAssignment;
use crate::record::{Record, RecordStatus};

/// Key-selection strategy for [`RecordRepository::find_keys_in_partitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBatchMode {
    /// Only return keys whose next eligible record is the oldest
    /// uncompleted record for that key.
    SkipKeysWithOpenOlderRecords,
    /// Return any key with at least one eligible `NEW` record.
    AllPendingKeys,
}

/// Persistence contract for [`Record`]s. Implementations are
/// external to this workspace in production (a SQL adapter, say); this
/// workspace ships only the in-memory reference implementation used by its
/// own test suites (`outbox-memory`).
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn save(&self, record: &Record) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    /// All incomplete (`NEW`) records for `key`, ordered by `created_at`
    /// ascending.
    async fn find_incomplete_by_key(&self, key: &str) -> Result<Vec<Record>, RepositoryError>;

    /// Keys with eligible work in any of `partitions`, limited to
    /// `batch_size`, selected per `mode`.
    async fn find_keys_in_partitions(
        &self,
        partitions: &[u16],
        status: RecordStatus,
        batch_size: usize,
        mode: KeyBatchMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, RepositoryError>;

    async fn count_by_partition(
        &self,
        partition: u16,
        status: RecordStatus,
    ) -> Result<u64, RepositoryError>;

    /// Housekeeping sweep: delete every record in `status`. Used by the
    /// opt-in `delete_on_complete`/retention sweep in `outbox-scheduler`.
    async fn delete_by_status(&self, status: RecordStatus) -> Result<u64, RepositoryError>;

    /// Records in `FAILED`, most recently created first, for operator
    /// inspection (see SPEC_FULL.md §C).
    async fn find_failed(&self, limit: usize) -> Result<Vec<Record>, RepositoryError>;
}

/// Persistence contract for [`Instance`]s.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn save(&self, instance: &Instance) -> Result<(), RepositoryError>;

    async fn find_active(&self) -> Result<Vec<Instance>, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Instance>, RepositoryError>;

    async fn find_with_stale_heartbeat(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns `false` if the row is absent (the caller re-registers).
    async fn update_heartbeat(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn update_status(
        &self,
        id: &str,
        status: InstanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Idempotent: deleting an already-absent row is success.
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}

/// Persistence contract for [`PartitionAssignment`]s.
#[async_trait]
pub trait PartitionAssignmentRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<PartitionAssignment>, RepositoryError>;

    async fn find_by_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<PartitionAssignment>, RepositoryError>;

    /// Insert all `TOTAL_PARTITIONS` rows, claimed by `instance_id`, in one
    /// transaction. `Ok(false)` signals "someone else already bootstrapped"
    /// (observed as a primary-key conflict in a SQL adapter) rather than an
    /// error — bootstrap races are an expected, cheap-to-detect outcome.
    async fn claim_all(&self, instance_id: &str) -> Result<bool, RepositoryError>;

    /// All-or-nothing reassignment of `partition_numbers` to
    /// `new_instance_id`, guarded by each row's current `version`. Returns
    /// `Ok(false)` if any targeted row was no longer stale or had moved to
    /// a different version — the whole claim is then abandoned, not
    /// partially applied.
    async fn claim_stale(
        &self,
        partition_numbers: &[u16],
        expected_versions: &[u64],
        new_instance_id: &str,
    ) -> Result<bool, RepositoryError>;

    /// Atomically free `partition_numbers`, conditioned on them currently
    /// being owned by `current_instance_id`. Returns the number of rows
    /// actually updated; a mismatch against the requested count signals a
    /// concurrent modification to the caller.
    async fn release_partitions(
        &self,
        partition_numbers: &[u16],
        current_instance_id: &str,
    ) -> Result<usize, RepositoryError>;
}
