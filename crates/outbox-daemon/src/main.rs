//! outbox-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, builds the shared
//! state, wires the three background timers plus the optional housekeeping
//! sweep, starts the HTTP status/SSE server, and shuts everything down on
//! `SIGINT`/`SIGTERM`. All route handlers live in `routes.rs`; all shared
//! state types live in `state.rs`.
//!
//! This binary has no subcommands. The one optional argument is a path to
//! a layered YAML config file; with none given it runs on `Config::default()`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use outbox_cluster::{spawn_heartbeat_loop, spawn_rebalance_loop, InstanceRegistry, PartitionCoordinator};
use outbox_config::Config;
use outbox_core::{policy_from_config, HandlerRegistry, PolicyRegistry};
use outbox_daemon::{routes, state};
use outbox_memory::{InMemoryInstanceRepository, InMemoryPartitionAssignmentRepository, InMemoryRecordRepository};
use outbox_schemas::RecordRepository;
use outbox_scheduler::{spawn_housekeeping_loop, spawn_poll_loop, Scheduler};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

struct NullCodec;
impl outbox_core::PayloadCodec for NullCodec {
    fn encode(&self, _payload: &dyn outbox_core::OutboxPayload) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn decode(
        &self,
        payload_type: &str,
        _value: &serde_json::Value,
    ) -> Result<Box<dyn outbox_core::OutboxPayload>, String> {
        Err(format!("no payload codec wired for this daemon build (payload_type={payload_type})"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let config = load_config()?;
    info!(poll_interval_ms = config.poll_interval_ms, "outbox-daemon starting");

    let record_repository: Arc<dyn RecordRepository> = Arc::new(InMemoryRecordRepository::new());
    let instance_repository = Arc::new(InMemoryInstanceRepository::new());
    let partition_repository = Arc::new(InMemoryPartitionAssignmentRepository::new());

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let port = bind_addr_from_env().map(|a| a.port()).unwrap_or(8899);

    let instances = Arc::new(InstanceRegistry::new(
        hostname,
        port,
        instance_repository,
        config.instance.clone(),
    ));
    instances.register(chrono::Utc::now()).await.context("register instance")?;

    let coordinator = Arc::new(PartitionCoordinator::new(partition_repository, Arc::clone(&instances)));
    coordinator
        .rebalance_cycle(chrono::Utc::now())
        .await
        .context("initial rebalance")?;

    // A standalone daemon has no business handlers of its own — applications
    // embedding this workspace register theirs before constructing a
    // `Scheduler`. This binary exists for local experimentation and cluster
    // smoke-testing over the in-memory repositories, so the registry starts
    // empty and any pre-existing records simply hit `UnknownHandler`.
    let registry = Arc::new(HandlerRegistry::builder().build());
    let policies = Arc::new(PolicyRegistry::new(policy_from_config(&config.retry), Default::default()));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&coordinator),
        Arc::clone(&record_repository),
        registry,
        policies,
        Arc::new(NullCodec),
        config.processing.clone(),
        config.batch_size,
    ));

    if let Ok(stuck) = scheduler
        .recover_stuck_claims(chrono::Utc::now(), chrono::Duration::hours(1))
        .await
    {
        if stuck > 0 {
            tracing::warn!(count = stuck, "found stuck NEW records at startup");
        }
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    spawn_heartbeat_loop(Arc::clone(&instances), shutdown_rx.clone());
    spawn_rebalance_loop(Arc::clone(&coordinator), config.rebalance_interval(), shutdown_rx.clone());
    spawn_poll_loop(Arc::clone(&scheduler), config.poll_interval(), shutdown_rx.clone());
    if config.processing.housekeeping_interval_ms > 0 {
        spawn_housekeeping_loop(
            Arc::clone(&record_repository),
            Duration::from_millis(config.processing.housekeeping_interval_ms),
            shutdown_rx.clone(),
        );
    }

    let shared = Arc::new(state::AppState::new(
        Arc::clone(&instances),
        Arc::clone(&coordinator),
        scheduler.handle(),
    ));
    state::spawn_bus_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("outbox-daemon listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("server crashed")?;

    info!("shutdown signal received, beginning graceful shutdown");
    let _ = shutdown_tx.send(true);
    instances
        .begin_graceful_shutdown(chrono::Utc::now())
        .await
        .context("begin graceful shutdown")?;
    tokio::time::sleep(instances.graceful_shutdown_timeout()).await;
    instances.finish_shutdown().await.context("finish shutdown")?;

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => outbox_config::loader::load_layered_yaml(&[path.as_str()]).context("load config file"),
        None => Ok(Config::default()),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("OUTBOX_DAEMON_ADDR").ok()?.parse().ok()
}

fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = ["http://localhost", "http://127.0.0.1"];

    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
