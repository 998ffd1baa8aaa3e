//! Processing Scheduler: poll tick, per-key worker pool,
//! strict per-key FIFO ordering.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use outbox_cluster::PartitionCoordinator;
use outbox_config::{KeyBatchMode as ConfigKeyBatchMode, ProcessingConfig};
use outbox_core::{HandlerRegistry, PayloadCodec, PolicyRegistry, ProcessorChain, ProcessorChainConfig};
use outbox_schemas::{KeyBatchMode, RecordRepository, RecordStatus};
use tokio::sync::{Notify, Semaphore};

fn to_schema_mode(mode: ConfigKeyBatchMode) -> KeyBatchMode {
    match mode {
        ConfigKeyBatchMode::SkipKeysWithOpenOlderRecords => KeyBatchMode::SkipKeysWithOpenOlderRecords,
        ConfigKeyBatchMode::AllPendingKeys => KeyBatchMode::AllPendingKeys,
    }
}

/// External handle to nudge a running scheduler between polling-timer
/// ticks. Coalesced: any number of calls between two
/// ticks result in at most one extra tick.
#[derive(Clone)]
pub struct SchedulerHandle {
    notify: Arc<Notify>,
}

impl SchedulerHandle {
    pub fn trigger_poll(&self) {
        self.notify.notify_one();
    }
}

pub struct Scheduler {
    coordinator: Arc<PartitionCoordinator>,
    record_repository: Arc<dyn RecordRepository>,
    registry: Arc<HandlerRegistry>,
    policies: Arc<PolicyRegistry>,
    codec: Arc<dyn PayloadCodec>,
    config: ProcessingConfig,
    batch_size: usize,
    notify: Arc<Notify>,
    in_flight: Mutex<HashSet<String>>,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        coordinator: Arc<PartitionCoordinator>,
        record_repository: Arc<dyn RecordRepository>,
        registry: Arc<HandlerRegistry>,
        policies: Arc<PolicyRegistry>,
        codec: Arc<dyn PayloadCodec>,
        config: ProcessingConfig,
        batch_size: usize,
    ) -> Self {
        let cap = if config.concurrency_limit > 0 {
            config.concurrency_limit as usize
        } else {
            config.worker_max
        };
        Self {
            coordinator,
            record_repository,
            registry,
            policies,
            codec,
            config,
            batch_size,
            notify: Arc::new(Notify::new()),
            in_flight: Mutex::new(HashSet::new()),
            permits: Arc::new(Semaphore::new(cap)),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            notify: self.notify.clone(),
        }
    }

    /// Run one poll tick: fetch eligible keys for owned partitions and
    /// submit one work unit per key not already in flight. Returns the
    /// number of keys newly dispatched.
    pub async fn poll_tick(self: &Arc<Self>) -> Result<usize, outbox_schemas::RepositoryError> {
        let assigned: Vec<u16> = self.coordinator.assigned_partitions().into_iter().collect();
        if assigned.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mode = to_schema_mode(self.config.key_batch_mode);
        let keys = self
            .record_repository
            .find_keys_in_partitions(&assigned, RecordStatus::New, self.batch_size, mode, now)
            .await?;

        let mut dispatched = 0;
        for key in keys {
            if !self.claim_key(&key) {
                continue;
            }
            dispatched += 1;
            let scheduler = Arc::clone(self);
            let key_for_task = key.clone();
            tokio::spawn(async move {
                scheduler.process_key(key_for_task.clone()).await;
                scheduler.release_key(&key_for_task);
            });
        }
        Ok(dispatched)
    }

    fn claim_key(&self, key: &str) -> bool {
        self.in_flight.lock().unwrap().insert(key.to_string())
    }

    fn release_key(&self, key: &str) {
        self.in_flight.lock().unwrap().remove(key);
    }

    async fn process_key(self: Arc<Self>, key: String) {
        let _permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let records = match self.record_repository.find_incomplete_by_key(&key).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to load records for key, retrying next tick");
                return;
            }
        };

        let chain_config = ProcessorChainConfig {
            delete_on_complete: self.config.delete_on_complete,
        };

        for mut record in records {
            let now = Utc::now();
            if !record.is_eligible(now) {
                break;
            }

            let payload = match self.codec.decode(&record.payload_type, &record.payload) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(record_id = %record.id, error = %err, "failed to decode payload, leaving record for next tick");
                    break;
                }
            };

            let chain = ProcessorChain::new(
                self.registry.as_ref(),
                self.policies.as_ref(),
                self.record_repository.as_ref(),
                &chain_config,
            );

            let outcome = match chain.run(&mut record, payload.as_ref()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(record_id = %record.id, error = %err, "processor chain repository error, leaving record for next tick");
                    break;
                }
            };

            let completed = matches!(outcome, outbox_core::ChainOutcome::Completed);
            if !completed && self.config.stop_on_first_failure {
                break;
            }
        }
    }

    /// Startup visibility sweep over stuck `NEW` records (see SPEC_FULL.md
    /// §C). Never mutates anything — it only logs.
    pub async fn recover_stuck_claims(
        &self,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Result<usize, outbox_schemas::RepositoryError> {
        let assigned: Vec<u16> = self.coordinator.assigned_partitions().into_iter().collect();
        if assigned.is_empty() {
            return Ok(0);
        }

        let keys = self
            .record_repository
            .find_keys_in_partitions(&assigned, RecordStatus::New, usize::MAX, KeyBatchMode::AllPendingKeys, now)
            .await?;

        let mut stuck = 0;
        for key in keys {
            for record in self.record_repository.find_incomplete_by_key(&key).await? {
                if record.status == RecordStatus::New && record.created_at < now - threshold {
                    tracing::warn!(
                        record_id = %record.id,
                        key = %record.key,
                        created_at = %record.created_at,
                        "stuck NEW record found at startup, possible clock skew or crash artifact"
                    );
                    stuck += 1;
                }
            }
        }
        Ok(stuck)
    }
}

/// Spawn the periodic poll timer, also woken by `SchedulerHandle::trigger_poll`.
pub fn spawn_poll_loop(
    scheduler: Arc<Scheduler>,
    interval: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let notify = scheduler.notify.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = notify.notified() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if let Err(err) = scheduler.poll_tick().await {
                tracing::warn!(error = %err, "poll tick failed, retrying next cycle");
            }
        }
    })
}
