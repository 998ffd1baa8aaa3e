//! Instance Registry: identity, heartbeats, stale-instance detection,
//! graceful shutdown.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use outbox_config::InstanceConfig;
use outbox_schemas::{Instance, InstanceRepository, InstanceStatus, RepositoryError};
use uuid::Uuid;

pub struct InstanceRegistry {
    instance_id: String,
    hostname: String,
    port: u16,
    repository: Arc<dyn InstanceRepository>,
    config: InstanceConfig,
}

impl InstanceRegistry {
    pub fn new(
        hostname: String,
        port: u16,
        repository: Arc<dyn InstanceRepository>,
        config: InstanceConfig,
    ) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            hostname,
            port,
            repository,
            config,
        }
    }

    pub fn current_instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Insert this process's row. Called once at startup, and again from
    /// `heartbeat_tick` if the row was found missing (e.g. evicted by a
    /// peer's stale-cleanup while this process was merely slow).
    pub async fn register(&self, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let instance = Instance::new(self.instance_id.clone(), self.hostname.clone(), self.port, now);
        self.repository.save(&instance).await
    }

    pub async fn active_instances(&self) -> Result<HashSet<String>, RepositoryError> {
        Ok(self
            .repository
            .find_active()
            .await?
            .into_iter()
            .map(|i| i.instance_id)
            .collect())
    }

    pub async fn is_active(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.active_instances().await?.contains(id))
    }

    /// Update this instance's heartbeat; re-register if the row was not
    /// found.
    pub async fn heartbeat_tick(&self, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let found = self.repository.update_heartbeat(&self.instance_id, now).await?;
        if !found {
            self.register(now).await?;
        }
        Ok(())
    }

    /// Delete any row whose heartbeat is older than `stale_timeout`, except
    /// this instance's own row. Deletion is idempotent.
    pub async fn cleanup_stale(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let cutoff = now - self.config.stale_timeout();
        let stale = self.repository.find_with_stale_heartbeat(cutoff).await?;
        let mut removed = 0;
        for instance in stale {
            if instance.instance_id != self.instance_id {
                self.repository.delete(&instance.instance_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn begin_graceful_shutdown(&self, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.repository
            .update_status(&self.instance_id, InstanceStatus::ShuttingDown, now)
            .await
    }

    pub async fn finish_shutdown(&self) -> Result<(), RepositoryError> {
        self.repository.delete(&self.instance_id).await
    }

    pub fn graceful_shutdown_timeout(&self) -> std::time::Duration {
        self.config.graceful_shutdown_timeout()
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        self.config.heartbeat_interval()
    }
}

/// Spawn the periodic heartbeat-plus-cleanup timer. Every error is logged
/// and swallowed — timers never die — the next tick tries again.
pub fn spawn_heartbeat_loop(
    registry: Arc<InstanceRegistry>,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let interval = registry.heartbeat_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    if let Err(err) = registry.heartbeat_tick(now).await {
                        tracing::warn!(error = %err, "heartbeat tick failed, retrying next cycle");
                    }
                    if let Err(err) = registry.cleanup_stale(now).await {
                        tracing::warn!(error = %err, "stale-instance cleanup failed, retrying next cycle");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_memory::InMemoryInstanceRepository;

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(
            "localhost".into(),
            8080,
            Arc::new(InMemoryInstanceRepository::new()),
            InstanceConfig::default(),
        )
    }

    #[tokio::test]
    async fn register_then_heartbeat_succeeds() {
        let reg = registry();
        let now = Utc::now();
        reg.register(now).await.unwrap();
        reg.heartbeat_tick(now + chrono::Duration::seconds(1)).await.unwrap();
        assert!(reg.is_active(reg.current_instance_id()).await.unwrap());
    }

    #[tokio::test]
    async fn heartbeat_reregisters_missing_row() {
        let reg = registry();
        let now = Utc::now();
        // Never called register() — row is absent.
        reg.heartbeat_tick(now).await.unwrap();
        assert!(reg.is_active(reg.current_instance_id()).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_removes_stale_peers_but_not_self() {
        let repo = Arc::new(InMemoryInstanceRepository::new());
        let now = Utc::now();
        let stale_peer = Instance::new("peer".into(), "host".into(), 1, now - chrono::Duration::seconds(60));
        repo.save(&stale_peer).await.unwrap();

        let reg = InstanceRegistry::new("localhost".into(), 8080, repo.clone(), InstanceConfig::default());
        reg.register(now).await.unwrap();

        let removed = reg.cleanup_stale(now).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_by_id("peer").await.unwrap().is_none());
        assert!(repo.find_by_id(reg.current_instance_id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn graceful_shutdown_then_finish_removes_row() {
        let reg = registry();
        let now = Utc::now();
        reg.register(now).await.unwrap();
        reg.begin_graceful_shutdown(now).await.unwrap();
        assert!(!reg.is_active(reg.current_instance_id()).await.unwrap());
        reg.finish_shutdown().await.unwrap();
        reg.finish_shutdown().await.unwrap(); // idempotent
    }
}
