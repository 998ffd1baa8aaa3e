//! In-memory `RecordRepository`. The one piece of persistence this
//! workspace carries — not because SQL schema work is in scope, but
//! because `outbox-core` and `outbox-scheduler` need something real to run
//! their own test suites against.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outbox_schemas::{KeyBatchMode, Record, RecordRepository, RecordStatus, RepositoryError};

#[derive(Default)]
pub struct InMemoryRecordRepository {
    rows: Mutex<HashMap<String, Record>>,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn save(&self, record: &Record) -> Result<(), RepositoryError> {
        self.rows.lock().unwrap().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }

    async fn find_incomplete_by_key(&self, key: &str) -> Result<Vec<Record>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<Record> = rows
            .values()
            .filter(|r| r.key == key && r.status != RecordStatus::Completed)
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.created_at);
        Ok(matches)
    }

    async fn find_keys_in_partitions(
        &self,
        partitions: &[u16],
        status: RecordStatus,
        batch_size: usize,
        mode: KeyBatchMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = self.rows.lock().unwrap();

        let mut by_key: HashMap<&str, Vec<&Record>> = HashMap::new();
        for record in rows.values() {
            if partitions.contains(&record.partition) {
                by_key.entry(record.key.as_str()).or_default().push(record);
            }
        }

        let mut eligible_keys = Vec::new();
        for (key, mut records) in by_key {
            records.sort_by_key(|r| r.created_at);

            let is_eligible = match mode {
                KeyBatchMode::AllPendingKeys => records
                    .iter()
                    .any(|r| r.status == status && r.is_eligible(now)),
                KeyBatchMode::SkipKeysWithOpenOlderRecords => {
                    // The oldest uncompleted record for this key must itself
                    // be the one that's eligible; an older incomplete record
                    // blocks the key entirely.
                    records
                        .iter()
                        .find(|r| r.status != RecordStatus::Completed)
                        .map(|r| r.status == status && r.is_eligible(now))
                        .unwrap_or(false)
                }
            };

            if is_eligible {
                eligible_keys.push(key.to_string());
            }
        }

        eligible_keys.sort();
        eligible_keys.truncate(batch_size);
        Ok(eligible_keys)
    }

    async fn count_by_partition(&self, partition: u16, status: RecordStatus) -> Result<u64, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|r| r.partition == partition && r.status == status)
            .count() as u64)
    }

    async fn delete_by_status(&self, status: RecordStatus) -> Result<u64, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, r| r.status != status);
        Ok((before - rows.len()) as u64)
    }

    async fn find_failed(&self, limit: usize) -> Result<Vec<Record>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut failed: Vec<Record> = rows
            .values()
            .filter(|r| r.status == RecordStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        failed.truncate(limit);
        Ok(failed)
    }
}
