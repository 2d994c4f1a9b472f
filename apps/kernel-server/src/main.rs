// apps/kernel-server/src/main.rs
// Purpose: Entry point. Boots the store, event bus, hub, and background
// workers, then serves the HTTP/WebSocket surface.
// Architecture: Application Boot
// Dependencies: Axum, Tower, Tokio

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use devswarm_kernel::bus::{EventBus, NullEventBus, RedisEventBus};
use devswarm_kernel::config::Config;
use devswarm_kernel::delta::DeltaPublisher;
use devswarm_kernel::dispatcher::Dispatcher;
use devswarm_kernel::hub::Hub;
use devswarm_kernel::orchestration::{HttpOrchestrator, Orchestrator};
use devswarm_kernel::server::{self, AppState};
use devswarm_kernel::snapshot::SnapshotAssembler;
use devswarm_kernel::store::postgres::PostgresStore;
use devswarm_kernel::store::Store;
use devswarm_kernel::worker::TaskQueueWorker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("devswarm_kernel=debug".parse().unwrap())
                .add_directive("tower_http=info".parse().unwrap()),
        )
        .json()
        .init();

    tracing::info!("initializing DevSwarm kernel...");

    let config = Config::from_env();

    let store: Arc<dyn Store> = Arc::new(
        PostgresStore::connect(&config.database_url)
            .await
            .expect("failed to connect to Postgres store"),
    );

    let bus: Arc<dyn EventBus> = match &config.redis_url {
        Some(url) => match RedisEventBus::connect(url).await {
            Some(bus) => Arc::new(bus),
            None => Arc::new(NullEventBus),
        },
        None => {
            tracing::warn!("REDIS_URL not set. Event bus degraded to no-op.");
            Arc::new(NullEventBus)
        }
    };

    let hub = Arc::new(Hub::new(config.hub_send_buffer));
    let snapshot = Arc::new(SnapshotAssembler::new(
        store.clone(),
        config.snapshot_messages_limit,
    ));
    let delta = Arc::new(DeltaPublisher::new(bus.clone()));
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(HttpOrchestrator::new(
        config.external_orchestration_base_url.clone(),
        config.http_timeout,
    ));
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .expect("reqwest client builds with a bounded timeout");

    let shutdown = CancellationToken::new();

    let bridge = devswarm_kernel::bridge::Bridge::new(
        bus.clone(),
        hub.clone(),
        snapshot.clone(),
        config.heartbeat_interval,
    );
    let bridge_token = shutdown.clone();
    tokio::spawn(async move { bridge.run(bridge_token).await });

    let task_worker = TaskQueueWorker::new(
        bus.clone(),
        store.clone(),
        orchestrator.clone(),
        "kernel-0".to_string(),
    );
    let worker_token = shutdown.clone();
    tokio::spawn(async move { task_worker.run(worker_token).await });

    let dispatcher = Dispatcher::new(
        store.clone(),
        delta.clone(),
        orchestrator.clone(),
        config.dispatcher_interval,
    );
    let dispatcher_token = shutdown.clone();
    tokio::spawn(async move { dispatcher.run(dispatcher_token).await });

    let listen_port = config.listen_port;
    let state = Arc::new(AppState {
        store,
        bus,
        hub,
        snapshot,
        delta,
        config,
        http_client,
    });

    let app = server::build_router(state);

    let addr = format!("0.0.0.0:{}", listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to port");

    tracing::info!("DevSwarm kernel listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("server error");
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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

    tracing::info!("shutdown signal received, stopping background workers");
    cancel.cancel();
}
