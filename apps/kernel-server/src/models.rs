// apps/kernel-server/src/models.rs
// Purpose: Core data models for the distribution core (agents, tasks, messages,
// office state, activity log, agent costs) plus their camelCase wire DTOs.
// Architecture: Shared Data Layer
// Dependencies: Serde, Chrono, Uuid

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where an agent currently "sits" in the virtual office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Room {
    #[serde(rename = "Private Office")]
    PrivateOffice,
    #[serde(rename = "War Room")]
    WarRoom,
    #[serde(rename = "Desks")]
    Desks,
    #[serde(rename = "Lounge")]
    Lounge,
    #[serde(rename = "Server Room")]
    ServerRoom,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Room::PrivateOffice => "Private Office",
            Room::WarRoom => "War Room",
            Room::Desks => "Desks",
            Room::Lounge => "Lounge",
            Room::ServerRoom => "Server Room",
        };
        f.write_str(s)
    }
}

impl FromStr for Room {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Private Office" => Ok(Room::PrivateOffice),
            "War Room" => Ok(Room::WarRoom),
            "Desks" => Ok(Room::Desks),
            "Lounge" => Ok(Room::Lounge),
            "Server Room" => Ok(Room::ServerRoom),
            other => Err(ModelParseError::InvalidRoom(other.to_string())),
        }
    }
}

/// An agent's current activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Working,
    Meeting,
    Error,
    #[serde(rename = "Clocked Out")]
    ClockedOut,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "Idle",
            AgentStatus::Working => "Working",
            AgentStatus::Meeting => "Meeting",
            AgentStatus::Error => "Error",
            AgentStatus::ClockedOut => "Clocked Out",
        };
        f.write_str(s)
    }
}

impl FromStr for AgentStatus {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(AgentStatus::Idle),
            "Working" => Ok(AgentStatus::Working),
            "Meeting" => Ok(AgentStatus::Meeting),
            "Error" => Ok(AgentStatus::Error),
            "Clocked Out" => Ok(AgentStatus::ClockedOut),
            other => Err(ModelParseError::InvalidAgentStatus(other.to_string())),
        }
    }
}

/// A task's position in the execution state machine (see dispatcher.rs §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Backlog,
    #[serde(rename = "In Progress")]
    InProgress,
    Review,
    Done,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Review => "Review",
            TaskStatus::Done => "Done",
            TaskStatus::Blocked => "Blocked",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Backlog" => Ok(TaskStatus::Backlog),
            "In Progress" => Ok(TaskStatus::InProgress),
            "Review" => Ok(TaskStatus::Review),
            "Done" => Ok(TaskStatus::Done),
            "Blocked" => Ok(TaskStatus::Blocked),
            other => Err(ModelParseError::InvalidTaskStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelParseError {
    #[error("invalid room: {0}")]
    InvalidRoom(String),
    #[error("invalid agent status: {0}")]
    InvalidAgentStatus(String),
    #[error("invalid task status: {0}")]
    InvalidTaskStatus(String),
}

/// Domain representation of an agent. `updated_at` is monotonically
/// non-decreasing; every store-level mutation refreshes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: String,
    pub room: Room,
    pub status: AgentStatus,
    pub current_task: String,
    pub thought_chain: String,
    pub tech_stack: Vec<String>,
    pub avatar_color: String,
    pub updated_at: DateTime<Utc>,
}

/// Domain representation of a task. `assigned_agents` is a set: the store
/// layer is responsible for de-duplicating on write.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub created_by: String,
    pub assigned_agents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

/// The singleton row tracked by the store; `version` is the sole
/// happens-before signal the bridge and hub rely on (spec.md §3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfficeState {
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub id: String,
    pub agent_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentCost {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
}

// === Wire DTOs (§6) ===
//
// Producers emit the documented camelCase field names. Ingress DTOs
// additionally accept snake_case via `#[serde(alias = ...)]` so older or
// non-JS clients can still PATCH/POST without translation (spec.md §9,
// "payload casing drift"). The domain structs above are never serialized
// directly; conversion is always explicit so a stray derive can't leak an
// internal field name onto the wire.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentWire {
    pub id: String,
    pub name: String,
    pub role: String,
    pub room: Room,
    pub status: AgentStatus,
    pub current_task: String,
    pub thought_chain: String,
    pub tech_stack: Vec<String>,
    pub avatar_color: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Agent> for AgentWire {
    fn from(a: &Agent) -> Self {
        AgentWire {
            id: a.id.clone(),
            name: a.name.clone(),
            role: a.role.clone(),
            room: a.room,
            status: a.status,
            current_task: a.current_task.clone(),
            thought_chain: a.thought_chain.clone(),
            tech_stack: a.tech_stack.clone(),
            avatar_color: a.avatar_color.clone(),
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWire {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub created_by: String,
    pub assigned_agents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskWire {
    fn from(t: &Task) -> Self {
        TaskWire {
            id: t.id.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            status: t.status,
            priority: t.priority,
            created_by: t.created_by.clone(),
            assigned_agents: t.assigned_agents.clone(),
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageWire {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageWire {
    fn from(m: &Message) -> Self {
        MessageWire {
            id: m.id.clone(),
            from_agent: m.from_agent.clone(),
            to_agent: m.to_agent.clone(),
            content: m.content.clone(),
            message_type: m.message_type.clone(),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCostWire {
    pub agent_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityWire {
    pub id: String,
    pub agent_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&ActivityEntry> for ActivityWire {
    fn from(a: &ActivityEntry) -> Self {
        ActivityWire {
            id: a.id.clone(),
            agent_id: a.agent_id.clone(),
            action: a.action.clone(),
            details: a.details.clone(),
            created_at: a.created_at,
        }
    }
}

// === Ingress DTOs ===

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(alias = "current_room")]
    pub current_room: Option<Room>,
    pub status: Option<AgentStatus>,
    #[serde(alias = "current_task")]
    pub current_task: Option<String>,
    #[serde(alias = "thought_chain")]
    pub thought_chain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, alias = "created_by")]
    pub created_by: String,
    #[serde(default, alias = "assigned_agents")]
    pub assigned_agents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusPatch {
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreate {
    #[serde(default, alias = "from_agent")]
    pub from_agent: String,
    #[serde(default, alias = "to_agent")]
    pub to_agent: String,
    pub content: String,
    #[serde(default = "default_message_type", alias = "message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "chat".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOverride {
    #[serde(default, alias = "global_status")]
    pub global_status: Option<AgentStatus>,
    #[serde(default, alias = "default_room")]
    pub default_room: Option<Room>,
    #[serde(default)]
    pub message: Option<String>,
}
