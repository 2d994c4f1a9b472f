// apps/kernel-server/tests/api_scenarios.rs
// Purpose: End-to-end HTTP surface scenarios (spec.md §8 S1-S3) exercised
// against the real Axum router wired to in-memory fakes for the Store and
// EventBus, following the teacher's house style of colocated tests but
// split into tests/ because these scenarios span the router, the store,
// and the delta publisher together.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use devswarm_kernel::bus::{EventBus, NullEventBus};
use devswarm_kernel::config::Config;
use devswarm_kernel::delta::DeltaPublisher;
use devswarm_kernel::hub::Hub;
use devswarm_kernel::models::{Agent, AgentStatus, Room};
use devswarm_kernel::server::{build_router, AppState};
use devswarm_kernel::snapshot::SnapshotAssembler;
use devswarm_kernel::store::memory::MemoryStore;
use devswarm_kernel::store::Store;

fn test_config() -> Config {
    Config {
        listen_port: 0,
        database_url: String::new(),
        redis_url: None,
        external_orchestration_base_url: "http://127.0.0.1:0".to_string(),
        bearer_token: None,
        cors_origins: vec![],
        heartbeat_interval: Duration::from_secs(30),
        dispatcher_interval: Duration::from_secs(2),
        write_deadline: Duration::from_secs(10),
        pong_deadline: Duration::from_secs(60),
        ping_period: Duration::from_secs(54),
        snapshot_messages_limit: 20,
        hub_send_buffer: 256,
        http_timeout: Duration::from_secs(30),
    }
}

fn agent(id: &str) -> Agent {
    Agent {
        id: id.to_string(),
        name: id.to_string(),
        role: "engineer".to_string(),
        room: Room::Desks,
        status: AgentStatus::Idle,
        current_task: String::new(),
        thought_chain: String::new(),
        tech_stack: vec![],
        avatar_color: "#000000".to_string(),
        updated_at: Utc::now(),
    }
}

/// Builds a router over a fresh `MemoryStore` seeded with `agent_ids`,
/// returning both the router and the concrete store (so tests can assert
/// on persisted state without going back through HTTP).
fn build_app(agent_ids: &[&str]) -> (axum::Router, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::new());
    for id in agent_ids {
        memory.seed_agent(agent(id));
    }

    let store: Arc<dyn Store> = memory.clone();
    let bus: Arc<dyn EventBus> = Arc::new(NullEventBus);
    let hub = Arc::new(Hub::new(256));
    let snapshot = Arc::new(SnapshotAssembler::new(store.clone(), 20));
    let delta = Arc::new(DeltaPublisher::new(bus.clone()));

    let state = Arc::new(AppState {
        store,
        bus,
        hub,
        snapshot,
        delta,
        config: test_config(),
        http_client: reqwest::Client::new(),
    });

    (build_router(state), memory)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok_without_auth() {
    let (app, _store) = build_app(&[]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn s1_create_task_returns_201_with_id() {
    let (app, store) = build_app(&["researcher"]);

    let payload = json!({
        "title": "Research multi-agent patterns",
        "status": "Backlog",
        "priority": 3,
        "createdBy": "orchestrator",
        "assignedAgents": ["researcher"]
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tasks")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let id = body["id"].as_str().expect("id field present").to_string();
    assert!(!id.is_empty());

    let stored: Arc<dyn Store> = store;
    let stored = stored.get_task(&id).await.unwrap().expect("task persisted");
    assert_eq!(stored.title, "Research multi-agent patterns");
    assert_eq!(stored.assigned_agents, vec!["researcher".to_string()]);
    assert_eq!(stored.created_by, "orchestrator");
}

#[tokio::test]
async fn create_task_rejects_empty_title_with_400() {
    let (app, _store) = build_app(&[]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tasks")
                .header("content-type", "application/json")
                .body(Body::from(json!({"title": "   "}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn s2_patch_agent_updates_status_room_and_task() {
    let (app, _store) = build_app(&["orchestrator"]);

    let payload = json!({
        "status": "Working",
        "current_room": "War Room",
        "current_task": "Sprint planning"
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/agents/orchestrator")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Working");
    assert_eq!(body["room"], "War Room");
    assert_eq!(body["currentTask"], "Sprint planning");
}

#[tokio::test]
async fn s3_override_state_sets_every_agent() {
    let (app, store) = build_app(&["abby", "ben", "cleo"]);

    let payload = json!({
        "global_status": "Clocked Out",
        "default_room": "Lounge",
        "message": "EOD"
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/state/override")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let stored: Arc<dyn Store> = store;
    for id in ["abby", "ben", "cleo"] {
        let agent = stored.get_agent(id).await.unwrap().expect("agent exists");
        assert_eq!(agent.status, AgentStatus::ClockedOut);
        assert_eq!(agent.room, Room::Lounge);
    }
}

#[tokio::test]
async fn get_agent_returns_404_for_unknown_id() {
    let (app, _store) = build_app(&[]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/agents/nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_route_rejects_missing_bearer_token() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory;
    let bus: Arc<dyn EventBus> = Arc::new(NullEventBus);
    let hub = Arc::new(Hub::new(256));
    let snapshot = Arc::new(SnapshotAssembler::new(store.clone(), 20));
    let delta = Arc::new(DeltaPublisher::new(bus.clone()));

    let mut config = test_config();
    config.bearer_token = Some("secret-token".to_string());

    let state = Arc::new(AppState {
        store,
        bus,
        hub,
        snapshot,
        delta,
        config,
        http_client: reqwest::Client::new(),
    });

    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/agents")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
