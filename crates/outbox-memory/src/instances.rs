//! In-memory `InstanceRepository`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outbox_schemas::{Instance, InstanceRepository, InstanceStatus, RepositoryError};

#[derive(Default)]
pub struct InMemoryInstanceRepository {
    rows: Mutex<HashMap<String, Instance>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn save(&self, instance: &Instance) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .unwrap()
            .insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.status == InstanceStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Instance>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_with_stale_heartbeat(&self, cutoff: DateTime<Utc>) -> Result<Vec<Instance>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.last_heartbeat < cutoff)
            .cloned()
            .collect())
    }

    async fn update_heartbeat(&self, id: &str, timestamp: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(id) {
            Some(instance) => {
                instance.touch_heartbeat(timestamp);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(
        &self,
        id: &str,
        status: InstanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(instance) = self.rows.lock().unwrap().get_mut(id) {
            instance.status = status;
            instance.updated_at = timestamp;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }
}
