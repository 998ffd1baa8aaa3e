//! Scenario: per-key ordering across two records sharing the same key.
//!
//! Two records share a key. The older one fails its first attempt; the
//! scheduler must not let the newer record progress until the older one
//! reaches a terminal or rescheduled-but-then-completed state.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use outbox_cluster::{InstanceRegistry, PartitionCoordinator};
use outbox_config::{InstanceConfig, ProcessingConfig, RetryConfig, RetryPolicyKind};
use outbox_core::{partition_of, policy_from_config, Handler, HandlerRegistry, OutboxPayload, PayloadCodec, PolicyRegistry};
use outbox_memory::{InMemoryInstanceRepository, InMemoryPartitionAssignmentRepository, InMemoryRecordRepository};
use outbox_scheduler::Scheduler;
use outbox_schemas::{HandlerError, Record};
use serde_json::json;
use std::any::Any;

struct LabeledPayload {
    label: String,
}
impl OutboxPayload for LabeledPayload {
    fn payload_type_name(&self) -> &'static str {
        "Labeled"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct LabeledCodec;
impl PayloadCodec for LabeledCodec {
    fn encode(&self, _payload: &dyn OutboxPayload) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn decode(&self, _payload_type: &str, value: &serde_json::Value) -> Result<Box<dyn OutboxPayload>, String> {
        let label = value.get("label").and_then(|v| v.as_str()).ok_or("missing label")?;
        Ok(Box::new(LabeledPayload { label: label.to_string() }))
    }
}

/// Fails the first time it sees "A", succeeds on every other call.
struct FlakyOnFirstA {
    log: Arc<Mutex<Vec<String>>>,
    a_attempts: AtomicUsize,
}

#[async_trait]
impl Handler for FlakyOnFirstA {
    async fn handle(&self, payload: &dyn OutboxPayload) -> Result<(), HandlerError> {
        let payload = payload.as_any().downcast_ref::<LabeledPayload>().unwrap();
        self.log.lock().unwrap().push(payload.label.clone());
        if payload.label == "A" && self.a_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(HandlerError::new("demo::Transient", "first attempt at A fails"));
        }
        Ok(())
    }
}

fn seeded_record(id: &str, key: &str, label: &str, created_at: chrono::DateTime<Utc>) -> Record {
    Record::new(
        id.into(),
        key.into(),
        json!({ "label": label }),
        "Labeled".into(),
        BTreeMap::new(),
        "h1".into(),
        partition_of(key),
        created_at,
    )
}

#[tokio::test]
async fn older_record_blocks_newer_record_on_the_same_key() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let records = Arc::new(InMemoryRecordRepository::new());
    let now = Utc::now();
    records.save(&seeded_record("r-a", "k", "A", now)).await.unwrap();
    records
        .save(&seeded_record("r-b", "k", "B", now + chrono::Duration::milliseconds(1)))
        .await
        .unwrap();

    let instance_repo = Arc::new(InMemoryInstanceRepository::new());
    let instances = Arc::new(InstanceRegistry::new("localhost".into(), 8080, instance_repo, InstanceConfig::default()));
    instances.register(now).await.unwrap();
    let partitions = Arc::new(InMemoryPartitionAssignmentRepository::new());
    let coordinator = Arc::new(PartitionCoordinator::new(partitions, Arc::clone(&instances)));
    coordinator.rebalance_cycle(now).await.unwrap();

    let registry = Arc::new(
        HandlerRegistry::builder()
            .register_typed(
                "h1",
                "Labeled",
                Arc::new(FlakyOnFirstA {
                    log: Arc::clone(&log),
                    a_attempts: AtomicUsize::new(0),
                }),
            )
            .unwrap()
            .build(),
    );
    // Zero-delay fixed retry so the rescheduled record is eligible again
    // on the very next tick, without sleeping for an exponential backoff.
    let retry_cfg = RetryConfig {
        policy: RetryPolicyKind::Fixed,
        ..RetryConfig::default()
    };
    let mut fixed = retry_cfg.clone();
    fixed.fixed.delay_ms = 0;
    let policies = Arc::new(PolicyRegistry::new(policy_from_config(&fixed), HashMap::new()));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&coordinator),
        records.clone() as Arc<dyn outbox_schemas::RecordRepository>,
        registry,
        policies,
        Arc::new(LabeledCodec),
        ProcessingConfig::default(),
        10,
    ));

    // First tick: A is attempted and fails; stop_on_first_failure (default
    // true) means B must not be touched yet.
    scheduler.poll_tick().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.lock().unwrap().as_slice(), &["A".to_string()]);

    // Second tick: A succeeds this time, then B is processed right after.
    scheduler.poll_tick().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.lock().unwrap().as_slice(), &["A".to_string(), "A".to_string(), "B".to_string()]);

    assert!(records.find_incomplete_by_key("k").await.unwrap().is_empty());
}
