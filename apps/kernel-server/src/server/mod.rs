// apps/kernel-server/src/server/mod.rs
// Purpose: Shared application state and router assembly for the HTTP
// surface (C10).
// Architecture: API layer
// Dependencies: Axum, tower-http

pub mod auth;
pub mod handlers;
pub mod proxy;

use axum::{
    http::Method,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::bus::EventBus;
use crate::config::Config;
use crate::delta::DeltaPublisher;
use crate::hub::Hub;
use crate::snapshot::SnapshotAssembler;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub bus: Arc<dyn EventBus>,
    pub hub: Arc<Hub>,
    pub snapshot: Arc<SnapshotAssembler>,
    pub delta: Arc<DeltaPublisher>,
    pub config: Config,
    pub http_client: reqwest::Client,
}

/// Builds the full router: frozen routes from spec.md §6, narrowed CORS
/// per the configured origins, and a per-request timeout, following the
/// teacher's `main.rs` shape of "configure CORS, build router, layer,
/// with_state" but generalized to the distribution core's own routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Credentials are allowed per spec.md §6, which rules out Any/permissive
    // (browsers reject `Access-Control-Allow-Credentials` paired with a
    // wildcard origin); `Config::from_env` defaults `cors_origins` to a
    // single local dev origin so this list is never empty.
    let origins = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::ACCEPT,
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300));

    let http_timeout = state.config.http_timeout;

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/agents", get(handlers::list_agents))
        .route("/agents/:id", get(handlers::get_agent))
        .route("/agents/:id", patch(handlers::patch_agent))
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks", post(handlers::create_task))
        .route("/tasks/:id/status", patch(handlers::patch_task_status))
        .route("/messages", get(handlers::list_messages))
        .route("/messages", post(handlers::create_message))
        .route("/state", get(handlers::get_state))
        .route("/state/override", post(handlers::override_state))
        .route("/costs", get(handlers::get_costs))
        .route("/activity", get(handlers::list_activity))
        .route("/trigger", post(proxy::proxy_to_orchestrator))
        .route("/simulate/*path", post(proxy::proxy_to_orchestrator))
        .route("/mcp/tools", get(proxy::proxy_to_orchestrator))
        .route("/ws", get(handlers::ws_upgrade));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(http_timeout))
        .layer(cors)
        .with_state(state)
}
