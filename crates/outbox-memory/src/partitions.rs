//! In-memory `PartitionAssignmentRepository`. Mirrors the conflict/version
//! semantics a SQL adapter would enforce through a primary key and a
//! conditional update, using a single process-wide mutex in their place.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use outbox_schemas::{PartitionAssignmentRepository, PartitionAssignment, RepositoryError, TOTAL_PARTITIONS};

#[derive(Default)]
pub struct InMemoryPartitionAssignmentRepository {
    rows: Mutex<HashMap<u16, PartitionAssignment>>,
}

impl InMemoryPartitionAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartitionAssignmentRepository for InMemoryPartitionAssignmentRepository {
    async fn find_all(&self) -> Result<Vec<PartitionAssignment>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<PartitionAssignment> = rows.values().cloned().collect();
        all.sort_by_key(|a| a.partition_number);
        Ok(all)
    }

    async fn find_by_instance(&self, instance_id: &str) -> Result<Vec<PartitionAssignment>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut owned: Vec<PartitionAssignment> = rows
            .values()
            .filter(|a| a.instance_id.as_deref() == Some(instance_id))
            .cloned()
            .collect();
        owned.sort_by_key(|a| a.partition_number);
        Ok(owned)
    }

    async fn claim_all(&self, instance_id: &str) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if !rows.is_empty() {
            // Mirrors the primary-key conflict a SQL adapter would surface
            // if the table were already bootstrapped.
            return Ok(false);
        }
        let now = Utc::now();
        for n in 0..TOTAL_PARTITIONS {
            rows.insert(
                n,
                PartitionAssignment {
                    partition_number: n,
                    instance_id: Some(instance_id.to_string()),
                    version: 0,
                    updated_at: now,
                },
            );
        }
        Ok(true)
    }

    async fn claim_stale(
        &self,
        partition_numbers: &[u16],
        expected_versions: &[u64],
        new_instance_id: &str,
    ) -> Result<bool, RepositoryError> {
        if partition_numbers.len() != expected_versions.len() {
            return Ok(false);
        }
        let mut rows = self.rows.lock().unwrap();

        for (n, expected_version) in partition_numbers.iter().zip(expected_versions) {
            match rows.get(n) {
                Some(row) if row.version == *expected_version => {}
                _ => return Ok(false),
            }
        }

        let now = Utc::now();
        for n in partition_numbers {
            if let Some(row) = rows.get_mut(n) {
                row.instance_id = Some(new_instance_id.to_string());
                row.version += 1;
                row.updated_at = now;
            }
        }
        Ok(true)
    }

    async fn release_partitions(
        &self,
        partition_numbers: &[u16],
        current_instance_id: &str,
    ) -> Result<usize, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let mut updated = 0;
        let now = Utc::now();
        for n in partition_numbers {
            if let Some(row) = rows.get_mut(n) {
                if row.instance_id.as_deref() == Some(current_instance_id) {
                    row.instance_id = None;
                    row.version += 1;
                    row.updated_at = now;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_inserts_all_partitions() {
        let repo = InMemoryPartitionAssignmentRepository::new();
        assert!(repo.claim_all("i1").await.unwrap());
        assert_eq!(repo.find_all().await.unwrap().len(), TOTAL_PARTITIONS as usize);
    }

    #[tokio::test]
    async fn second_bootstrap_loses() {
        let repo = InMemoryPartitionAssignmentRepository::new();
        assert!(repo.claim_all("i1").await.unwrap());
        assert!(!repo.claim_all("i2").await.unwrap());
    }

    #[tokio::test]
    async fn claim_stale_is_all_or_nothing_on_version_mismatch() {
        let repo = InMemoryPartitionAssignmentRepository::new();
        repo.claim_all("i1").await.unwrap();
        repo.release_partitions(&[0, 1], "i1").await.unwrap();

        // version for partition 1 is now 1, claim with a stale expectation of 0
        let ok = repo.claim_stale(&[0, 1], &[1, 0], "i2").await.unwrap();
        assert!(!ok);
        // partition 0 must remain untouched since the claim was rejected wholesale
        let rows = repo.find_all().await.unwrap();
        let p0 = rows.iter().find(|r| r.partition_number == 0).unwrap();
        assert_eq!(p0.instance_id, None);
    }

    #[tokio::test]
    async fn claim_stale_succeeds_when_versions_match() {
        let repo = InMemoryPartitionAssignmentRepository::new();
        repo.claim_all("i1").await.unwrap();
        repo.release_partitions(&[0, 1], "i1").await.unwrap();

        let ok = repo.claim_stale(&[0, 1], &[1, 1], "i2").await.unwrap();
        assert!(ok);
        let owned = repo.find_by_instance("i2").await.unwrap();
        assert_eq!(owned.len(), 2);
    }

    #[tokio::test]
    async fn release_only_affects_rows_owned_by_caller() {
        let repo = InMemoryPartitionAssignmentRepository::new();
        repo.claim_all("i1").await.unwrap();

        let released = repo.release_partitions(&[0, 1], "i2").await.unwrap();
        assert_eq!(released, 0);
    }
}
