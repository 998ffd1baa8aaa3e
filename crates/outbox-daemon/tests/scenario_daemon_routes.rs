//! Scenario: basic HTTP surface of outbox-daemon.
//!
//! Pure in-process router tests, no network bind required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use outbox_cluster::{InstanceRegistry, PartitionCoordinator};
use outbox_config::InstanceConfig;
use outbox_core::{policy_from_config, HandlerRegistry, PolicyRegistry};
use outbox_daemon::{routes, state};
use outbox_memory::{InMemoryInstanceRepository, InMemoryPartitionAssignmentRepository, InMemoryRecordRepository};
use outbox_scheduler::Scheduler;
use tower::ServiceExt;

struct NullCodec;
impl outbox_core::PayloadCodec for NullCodec {
    fn encode(&self, _payload: &dyn outbox_core::OutboxPayload) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn decode(&self, _payload_type: &str, _value: &serde_json::Value) -> Result<Box<dyn outbox_core::OutboxPayload>, String> {
        Err("no codec wired in test".to_string())
    }
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

async fn shared_state() -> Arc<state::AppState> {
    let instance_repo = Arc::new(InMemoryInstanceRepository::new());
    let instances = Arc::new(InstanceRegistry::new("localhost".into(), 8080, instance_repo, InstanceConfig::default()));
    instances.register(chrono::Utc::now()).await.unwrap();

    let partition_repo = Arc::new(InMemoryPartitionAssignmentRepository::new());
    let coordinator = Arc::new(PartitionCoordinator::new(partition_repo, Arc::clone(&instances)));
    coordinator.rebalance_cycle(chrono::Utc::now()).await.unwrap();

    let registry = Arc::new(HandlerRegistry::builder().build());
    let policies = Arc::new(PolicyRegistry::new(
        policy_from_config(&outbox_config::RetryConfig::default()),
        Default::default(),
    ));
    let records = Arc::new(InMemoryRecordRepository::new());
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&coordinator),
        records,
        registry,
        policies,
        Arc::new(NullCodec),
        outbox_config::ProcessingConfig::default(),
        10,
    ));

    Arc::new(state::AppState::new(instances, coordinator, scheduler.handle()))
}

#[tokio::test]
async fn health_reports_ok() {
    let st = shared_state().await;
    let req = Request::builder().method("GET").uri("/v1/health").body(axum::body::Body::empty()).unwrap();
    let (status, body) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["ok"], true);
}

#[tokio::test]
async fn status_reports_all_256_partitions_for_a_solo_instance() {
    let st = shared_state().await;
    let req = Request::builder().method("GET").uri("/v1/status").body(axum::body::Body::empty()).unwrap();
    let (status, body) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["assigned_partitions"], 256);
}

#[tokio::test]
async fn trigger_poll_is_accepted() {
    let st = shared_state().await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/scheduler/trigger")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _body) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}
