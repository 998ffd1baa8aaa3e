use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ownership row for one of the `TOTAL_PARTITIONS` fixed partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionAssignment {
    pub partition_number: u16,
    pub instance_id: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl PartitionAssignment {
    pub fn unassigned(partition_number: u16, now: DateTime<Utc>) -> Self {
        Self {
            partition_number,
            instance_id: None,
            version: 0,
            updated_at: now,
        }
    }

    pub fn is_free(&self) -> bool {
        self.instance_id.is_none()
    }

    /// Stale iff owned by an instance that is no longer active (including
    /// the "free" case, which is trivially not owned by anyone active).
    pub fn is_stale(&self, active_instance_ids: &std::collections::HashSet<String>) -> bool {
        match &self.instance_id {
            None => true,
            Some(id) => !active_instance_ids.contains(id),
        }
    }
}
