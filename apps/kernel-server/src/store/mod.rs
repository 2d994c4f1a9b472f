// apps/kernel-server/src/store/mod.rs
// Purpose: Store trait (C1): the durable home for agents, tasks, messages,
// the office_state version counter, the activity log, and agent costs.
// Architecture: Persistence port
// Dependencies: async-trait, sqlx (postgres.rs), none (memory.rs)

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::models::{
    Agent, AgentCost, AgentStatus, ActivityEntry, Message, Room, Task, TaskStatus,
};
use async_trait::async_trait;

/// The coherent read `get_full_state` returns: every entity it contains is
/// at least as fresh as the accompanying version (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub agents: Vec<Agent>,
    pub messages: Vec<Message>,
    pub tasks: Vec<Task>,
}

/// Partial update applied to an agent by `PATCH /agents/{id}`.
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub room: Option<Room>,
    pub status: Option<AgentStatus>,
    pub current_task: Option<String>,
    pub thought_chain: Option<String>,
}

/// Fields needed to create a task (`POST /tasks`).
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub created_by: String,
    pub assigned_agents: Vec<String>,
}

/// Fields needed to create a message (`POST /messages`).
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub message_type: String,
}

/// Durable store for everything in spec.md §3. Implementors must:
/// - serialize writes to a single entity,
/// - make `bump_version` atomic on the singleton row,
/// - never fail a by-id read just because the id is absent (return `Ok(None)`).
#[async_trait]
pub trait Store: Send + Sync {
    /// Liveness check used by `GET /health`.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;
    async fn update_agent(
        &self,
        id: &str,
        update: AgentUpdate,
    ) -> Result<Option<Agent>, StoreError>;
    /// Bulk-sets `status`/`room` on every agent (`POST /state/override`).
    async fn override_agents(
        &self,
        status: Option<AgentStatus>,
        room: Option<Room>,
    ) -> Result<Vec<Agent>, StoreError>;
    /// Agents currently `Idle`, for the dispatcher's per-cycle snapshot.
    async fn list_idle_agents(&self) -> Result<Vec<Agent>, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;
    async fn list_tasks(&self, agent_id: Option<&str>) -> Result<Vec<Task>, StoreError>;
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StoreError>;
    async fn set_task_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> Result<Option<Task>, StoreError>;
    /// Tasks assigned to `agent_id` sitting in `Backlog`, the dispatcher's
    /// drain candidates.
    async fn list_backlog_tasks(&self, agent_id: &str) -> Result<Vec<Task>, StoreError>;

    async fn list_messages(
        &self,
        limit: i64,
        agent_id: Option<&str>,
    ) -> Result<Vec<Message>, StoreError>;
    async fn create_message(&self, new_message: NewMessage) -> Result<Message, StoreError>;

    async fn list_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, StoreError>;
    async fn log_activity(
        &self,
        agent_id: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn get_costs(&self) -> Result<Vec<(String, AgentCost)>, StoreError>;

    /// Atomically sets `version := version + 1`. Idempotence is NOT
    /// guaranteed; callers invoke exactly once per mutation (spec.md §4.1).
    async fn bump_version(&self) -> Result<i64, StoreError>;
    async fn current_version(&self) -> Result<i64, StoreError>;

    /// Reads agents, recent messages (bounded), all tasks with assignees,
    /// and the current version in one logical read.
    async fn get_full_state(&self, messages_limit: i64) -> Result<(StoreSnapshot, i64), StoreError>;
}
