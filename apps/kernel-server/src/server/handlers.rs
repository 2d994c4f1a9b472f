// apps/kernel-server/src/server/handlers.rs
// Purpose: HTTP surface (C10): parse, validate, mutate via the store,
// bump version, publish deltas, log activity, return JSON.
// Architecture: API layer
// Dependencies: Axum

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{
    ActivityWire, AgentCostWire, AgentPatch, AgentWire, MessageCreate, MessageWire,
    StateOverride, TaskCreate, TaskStatusPatch, TaskWire,
};
use crate::server::auth::AuthorizedRequest;
use crate::server::AppState;
use crate::store::{AgentUpdate, NewMessage, NewTask};

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(json!({ "status": "ok", "service": "devswarm-kernel", "database": "up" })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "service": "devswarm-kernel", "database": e.to_string() })),
        ),
    }
}

pub async fn list_agents(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AgentWire>>, ApiError> {
    let agents = state.store.list_agents().await?;
    Ok(Json(agents.iter().map(AgentWire::from).collect()))
}

pub async fn get_agent(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AgentWire>, ApiError> {
    let agent = state.store.get_agent(&id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(AgentWire::from(&agent)))
}

pub async fn patch_agent(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<AgentPatch>,
) -> Result<Json<AgentWire>, ApiError> {
    let update = AgentUpdate {
        room: patch.current_room,
        status: patch.status,
        current_task: patch.current_task,
        thought_chain: patch.thought_chain,
    };

    let agent = state
        .store
        .update_agent(&id, update)
        .await?
        .ok_or(ApiError::NotFound)?;

    state.store.bump_version().await?;
    state.delta.publish_agent(&agent).await;
    state
        .store
        .log_activity(&id, "agent_patched", json!({}))
        .await?;

    Ok(Json(AgentWire::from(&agent)))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    agent_id: Option<String>,
}

pub async fn list_tasks(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskWire>>, ApiError> {
    let tasks = state.store.list_tasks(query.agent_id.as_deref()).await?;
    Ok(Json(tasks.iter().map(TaskWire::from).collect()))
}

pub async fn create_task(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TaskCreate>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::InvalidInput("title must not be empty".to_string()));
    }

    let task = state
        .store
        .create_task(NewTask {
            title: payload.title,
            description: payload.description,
            status: payload.status.unwrap_or(crate::models::TaskStatus::Backlog),
            priority: payload.priority,
            created_by: payload.created_by,
            assigned_agents: payload.assigned_agents,
        })
        .await?;

    state.store.bump_version().await?;
    state.delta.publish_task(&task).await;
    state
        .store
        .log_activity(&task.created_by, "task_created", json!({ "task_id": task.id }))
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({ "id": task.id })),
    ))
}

pub async fn patch_task_status(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<TaskStatusPatch>,
) -> Result<Json<TaskWire>, ApiError> {
    let task = state
        .store
        .set_task_status(&id, patch.status)
        .await?
        .ok_or(ApiError::NotFound)?;

    state.store.bump_version().await?;
    state.delta.publish_task(&task).await;
    state
        .store
        .log_activity("", "task_status_changed", json!({ "task_id": task.id }))
        .await?;

    Ok(Json(TaskWire::from(&task)))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    limit: Option<i64>,
    agent_id: Option<String>,
}

pub async fn list_messages(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageWire>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let messages = state
        .store
        .list_messages(limit, query.agent_id.as_deref())
        .await?;
    Ok(Json(messages.iter().map(MessageWire::from).collect()))
}

pub async fn create_message(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MessageCreate>,
) -> Result<Json<MessageWire>, ApiError> {
    if payload.content.trim().is_empty() {
        return Err(ApiError::InvalidInput("content must not be empty".to_string()));
    }

    let message = state
        .store
        .create_message(NewMessage {
            from_agent: payload.from_agent,
            to_agent: payload.to_agent,
            content: payload.content,
            message_type: payload.message_type,
        })
        .await?;

    state.store.bump_version().await?;
    state.delta.publish_message(&message).await;

    Ok(Json(MessageWire::from(&message)))
}

pub async fn get_state(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state.snapshot.assemble_text().await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    ))
}

pub async fn override_state(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StateOverride>,
) -> Result<Json<Vec<AgentWire>>, ApiError> {
    if payload.global_status.is_none() || payload.default_room.is_none() {
        return Ok(Json(
            state
                .store
                .list_agents()
                .await?
                .iter()
                .map(AgentWire::from)
                .collect(),
        ));
    }

    let agents = state
        .store
        .override_agents(payload.global_status, payload.default_room)
        .await?;

    state.store.bump_version().await?;
    for agent in &agents {
        state.delta.publish_agent(agent).await;
    }
    state
        .store
        .log_activity("", "state_overridden", json!({ "message": payload.message }))
        .await?;

    Ok(Json(agents.iter().map(AgentWire::from).collect()))
}

pub async fn get_costs(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AgentCostWire>>, ApiError> {
    let costs = state.store.get_costs().await?;
    Ok(Json(
        costs
            .into_iter()
            .map(|(agent_id, cost)| AgentCostWire {
                agent_id,
                input_tokens: cost.input_tokens,
                output_tokens: cost.output_tokens,
                cost: cost.cost,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListActivityQuery {
    limit: Option<i64>,
}

pub async fn list_activity(
    _auth: AuthorizedRequest,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListActivityQuery>,
) -> Result<Json<Vec<ActivityWire>>, ApiError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let activity = state.store.list_activity(limit).await?;
    Ok(Json(activity.iter().map(ActivityWire::from).collect()))
}

pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    let config = crate::ws::ConnectionConfig {
        ping_period: state.config.ping_period,
        pong_deadline: state.config.pong_deadline,
        write_deadline: state.config.write_deadline,
    };
    ws.on_upgrade(move |socket| crate::ws::handle_socket(socket, hub, config))
}
