// apps/kernel-server/src/store/memory.rs
// Purpose: In-memory Store used by unit/integration tests and local dev
// without Postgres. Mirrors the semantics of PostgresStore exactly:
// same version bump behavior, same dedup-on-assign behavior.
// Architecture: Persistence adapter (test double)
// Dependencies: dashmap

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Agent, AgentCost, AgentStatus, ActivityEntry, Message, Room, Task, TaskStatus};
use crate::store::{AgentUpdate, NewMessage, NewTask, Store, StoreSnapshot};

pub struct MemoryStore {
    agents: DashMap<String, Agent>,
    tasks: DashMap<String, Task>,
    messages: Mutex<Vec<Message>>,
    activity: Mutex<Vec<ActivityEntry>>,
    costs: DashMap<String, AgentCost>,
    version: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            agents: DashMap::new(),
            tasks: DashMap::new(),
            messages: Mutex::new(Vec::new()),
            activity: Mutex::new(Vec::new()),
            costs: DashMap::new(),
            version: AtomicI64::new(0),
        }
    }

    /// Seeds an agent directly, bypassing version bumps, for test setup.
    pub fn seed_agent(&self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.get(id).map(|a| a.clone()))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self.agents.iter().map(|a| a.clone()).collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn update_agent(
        &self,
        id: &str,
        update: AgentUpdate,
    ) -> Result<Option<Agent>, StoreError> {
        let mut entry = match self.agents.get_mut(id) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if let Some(room) = update.room {
            entry.room = room;
        }
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(current_task) = update.current_task {
            entry.current_task = current_task;
        }
        if let Some(thought_chain) = update.thought_chain {
            entry.thought_chain = thought_chain;
        }
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    async fn override_agents(
        &self,
        status: Option<AgentStatus>,
        room: Option<Room>,
    ) -> Result<Vec<Agent>, StoreError> {
        let mut updated = Vec::new();
        for mut entry in self.agents.iter_mut() {
            if let Some(status) = status {
                entry.status = status;
            }
            if let Some(room) = room {
                entry.room = room;
            }
            entry.updated_at = Utc::now();
            updated.push(entry.clone());
        }
        updated.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(updated)
    }

    async fn list_idle_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|a| a.status == AgentStatus::Idle)
            .map(|a| a.clone())
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.get(id).map(|t| t.clone()))
    }

    async fn list_tasks(&self, agent_id: Option<&str>) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| match agent_id {
                Some(agent_id) => t.assigned_agents.iter().any(|a| a == agent_id),
                None => true,
            })
            .map(|t| t.clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn create_task(&self, new_task: NewTask) -> Result<Task, StoreError> {
        if new_task.title.trim().is_empty() {
            return Err(StoreError::Invalid("task title must not be empty".into()));
        }

        let mut assigned_agents = new_task.assigned_agents;
        assigned_agents.sort();
        assigned_agents.dedup();

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new_task.title,
            description: new_task.description,
            status: new_task.status,
            priority: new_task.priority,
            created_by: new_task.created_by,
            assigned_agents,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn set_task_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> Result<Option<Task>, StoreError> {
        let mut entry = match self.tasks.get_mut(id) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    async fn list_backlog_tasks(&self, agent_id: &str) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| {
                t.status == TaskStatus::Backlog && t.assigned_agents.iter().any(|a| a == agent_id)
            })
            .map(|t| t.clone())
            .collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(tasks)
    }

    async fn list_messages(
        &self,
        limit: i64,
        agent_id: Option<&str>,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.lock().unwrap();
        let mut filtered: Vec<Message> = messages
            .iter()
            .filter(|m| match agent_id {
                Some(agent_id) => m.from_agent == agent_id || m.to_agent == agent_id,
                None => true,
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        filtered.truncate(limit.max(0) as usize);
        Ok(filtered)
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<Message, StoreError> {
        if new_message.content.trim().is_empty() {
            return Err(StoreError::Invalid("message content must not be empty".into()));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            from_agent: new_message.from_agent,
            to_agent: new_message.to_agent,
            content: new_message.content,
            message_type: new_message.message_type,
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn list_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, StoreError> {
        let activity = self.activity.lock().unwrap();
        let mut entries: Vec<ActivityEntry> = activity.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn log_activity(
        &self,
        agent_id: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        let entry = ActivityEntry {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            details,
            created_at: Utc::now(),
        };
        self.activity.lock().unwrap().push(entry);
        Ok(())
    }

    async fn get_costs(&self) -> Result<Vec<(String, AgentCost)>, StoreError> {
        Ok(self
            .costs
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    async fn bump_version(&self) -> Result<i64, StoreError> {
        Ok(self.version.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn current_version(&self) -> Result<i64, StoreError> {
        Ok(self.version.load(Ordering::SeqCst))
    }

    async fn get_full_state(&self, messages_limit: i64) -> Result<(StoreSnapshot, i64), StoreError> {
        let version = self.version.load(Ordering::SeqCst);
        let agents = self.list_agents().await?;
        let messages = self.list_messages(messages_limit, None).await?;
        let tasks = self.list_tasks(None).await?;
        Ok((
            StoreSnapshot {
                agents,
                messages,
                tasks,
            },
            version,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn create_task_dedups_assignees() {
        let store = MemoryStore::new();
        let task = store
            .create_task(NewTask {
                title: "ship it".into(),
                description: String::new(),
                status: TaskStatus::Backlog,
                priority: 0,
                created_by: "abby".into(),
                assigned_agents: vec!["abby".into(), "abby".into(), "ben".into()],
            })
            .await
            .unwrap();
        assert_eq!(task.assigned_agents, vec!["abby".to_string(), "ben".to_string()]);
    }

    #[tokio::test]
    async fn bump_version_is_monotonic() {
        let store = MemoryStore::new();
        let v1 = store.bump_version().await.unwrap();
        let v2 = store.bump_version().await.unwrap();
        assert_eq!(v1 + 1, v2);
        assert_eq!(store.current_version().await.unwrap(), v2);
    }

    #[tokio::test]
    async fn list_idle_agents_filters_by_status() {
        let store = MemoryStore::new();
        let mut working = agent("busy");
        working.status = AgentStatus::Working;
        store.seed_agent(agent("idle-one"));
        store.seed_agent(working);

        let idle = store.list_idle_agents().await.unwrap();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].id, "idle-one");
    }

    #[tokio::test]
    async fn create_task_rejects_empty_title() {
        let store = MemoryStore::new();
        let result = store
            .create_task(NewTask {
                title: "   ".into(),
                description: String::new(),
                status: TaskStatus::Backlog,
                priority: 0,
                created_by: "abby".into(),
                assigned_agents: vec![],
            })
            .await;
        assert!(result.is_err());
    }
}
