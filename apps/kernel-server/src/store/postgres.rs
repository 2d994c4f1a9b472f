// apps/kernel-server/src/store/postgres.rs
// Purpose: PostgreSQL-backed implementation of the Store trait (C1).
// Architecture: Persistence adapter
// Dependencies: sqlx

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Agent, AgentCost, AgentStatus, ActivityEntry, Message, Room, Task, TaskStatus,
};
use crate::store::{AgentUpdate, NewMessage, NewTask, Store, StoreSnapshot};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects with the pool sizing suggested by spec.md §5 (max 20,
    /// min 2, 5 minute idle eviction, 30 second health-check/acquire
    /// timeout) and runs the crate's embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .idle_timeout(Some(Duration::from_secs(300)))
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(PostgresStore { pool })
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    name: String,
    role: String,
    room: String,
    status: String,
    current_task: String,
    thought_chain: String,
    tech_stack: Vec<String>,
    avatar_color: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            id: row.id,
            name: row.name,
            role: row.role,
            room: Room::from_str(&row.room)?,
            status: AgentStatus::from_str(&row.status)?,
            current_task: row.current_task,
            thought_chain: row.thought_chain,
            tech_stack: row.tech_stack,
            avatar_color: row.avatar_color,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    status: String,
    priority: i32,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    from_agent: String,
    to_agent: String,
    content: String,
    message_type: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            from_agent: row.from_agent,
            to_agent: row.to_agent,
            content: row.content,
            message_type: row.message_type,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    agent_id: String,
    action: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityEntry {
    fn from(row: ActivityRow) -> Self {
        ActivityEntry {
            id: row.id,
            agent_id: row.agent_id,
            action: row.action,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

impl PostgresStore {
    async fn assignees_for(&self, task_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT agent_id FROM task_assignments WHERE task_id = $1")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("agent_id")).collect())
    }

    async fn hydrate_task(&self, row: TaskRow) -> Result<Task, StoreError> {
        let assigned_agents = self.assignees_for(&row.id).await?;
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            status: TaskStatus::from_str(&row.status)?,
            priority: row.priority,
            created_by: row.created_by,
            assigned_agents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn update_agent(
        &self,
        id: &str,
        update: AgentUpdate,
    ) -> Result<Option<Agent>, StoreError> {
        let row: Option<AgentRow> = sqlx::query_as(
            r#"
            UPDATE agents SET
                room = COALESCE($2, room),
                status = COALESCE($3, status),
                current_task = COALESCE($4, current_task),
                thought_chain = COALESCE($5, thought_chain),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.room.map(|r| r.to_string()))
        .bind(update.status.map(|s| s.to_string()))
        .bind(update.current_task)
        .bind(update.thought_chain)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Agent::try_from).transpose()
    }

    async fn override_agents(
        &self,
        status: Option<AgentStatus>,
        room: Option<Room>,
    ) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            r#"
            UPDATE agents SET
                status = COALESCE($1, status),
                room = COALESCE($2, room),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(status.map(|s| s.to_string()))
        .bind(room.map(|r| r.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn list_idle_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<AgentRow> =
            sqlx::query_as("SELECT * FROM agents WHERE status = 'Idle' ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(self.hydrate_task(r).await?)),
            None => Ok(None),
        }
    }

    async fn list_tasks(&self, agent_id: Option<&str>) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = match agent_id {
            Some(agent_id) => {
                sqlx::query_as(
                    r#"
                    SELECT t.* FROM tasks t
                    JOIN task_assignments a ON a.task_id = t.id
                    WHERE a.agent_id = $1
                    ORDER BY t.created_at DESC
                    "#,
                )
                .bind(agent_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM tasks ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.hydrate_task(row).await?);
        }
        Ok(tasks)
    }

    async fn create_task(&self, new_task: NewTask) -> Result<Task, StoreError> {
        if new_task.title.trim().is_empty() {
            return Err(StoreError::Invalid("task title must not be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let row: TaskRow = sqlx::query_as(
            r#"
            INSERT INTO tasks (id, title, description, status, priority, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .bind(new_task.status.to_string())
        .bind(new_task.priority)
        .bind(&new_task.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let mut assigned_agents: Vec<String> = new_task.assigned_agents;
        assigned_agents.sort();
        assigned_agents.dedup();

        for agent_id in &assigned_agents {
            sqlx::query(
                "INSERT INTO task_assignments (task_id, agent_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(&id)
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            status: TaskStatus::from_str(&row.status)?,
            priority: row.priority,
            created_by: row.created_by,
            assigned_agents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn set_task_status(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            "UPDATE tasks SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(self.hydrate_task(r).await?)),
            None => Ok(None),
        }
    }

    async fn list_backlog_tasks(&self, agent_id: &str) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT t.* FROM tasks t
            JOIN task_assignments a ON a.task_id = t.id
            WHERE a.agent_id = $1 AND t.status = 'Backlog'
            ORDER BY t.priority DESC, t.created_at ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.hydrate_task(row).await?);
        }
        Ok(tasks)
    }

    async fn list_messages(
        &self,
        limit: i64,
        agent_id: Option<&str>,
    ) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = match agent_id {
            Some(agent_id) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM messages
                    WHERE from_agent = $1 OR to_agent = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(agent_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM messages ORDER BY created_at DESC LIMIT $1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<Message, StoreError> {
        if new_message.content.trim().is_empty() {
            return Err(StoreError::Invalid("message content must not be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO messages (id, from_agent, to_agent, content, message_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new_message.from_agent)
        .bind(&new_message.to_agent)
        .bind(&new_message.content)
        .bind(&new_message.message_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, StoreError> {
        let rows: Vec<ActivityRow> =
            sqlx::query_as("SELECT * FROM activity_log ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }

    async fn log_activity(
        &self,
        agent_id: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO activity_log (id, agent_id, action, details) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(agent_id)
        .bind(action)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_costs(&self) -> Result<Vec<(String, AgentCost)>, StoreError> {
        let rows = sqlx::query("SELECT agent_id, input_tokens, output_tokens, cost FROM agent_costs")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get("agent_id"),
                    AgentCost {
                        input_tokens: r.get("input_tokens"),
                        output_tokens: r.get("output_tokens"),
                        cost: r.get("cost"),
                    },
                )
            })
            .collect())
    }

    async fn bump_version(&self) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "UPDATE office_state SET version = version + 1 WHERE id = 1 RETURNING version",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("version"))
    }

    async fn current_version(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT version FROM office_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("version"))
    }

    async fn get_full_state(&self, messages_limit: i64) -> Result<(StoreSnapshot, i64), StoreError> {
        // A single transaction gives us a read-consistent view: the version
        // read here is guaranteed valid at the time the rest of the rows
        // were read (spec.md §4.1).
        let mut tx = self.pool.begin().await?;

        let version: i64 = sqlx::query("SELECT version FROM office_state WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?
            .get("version");

        let agent_rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;
        let agents = agent_rows
            .into_iter()
            .map(Agent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let message_rows: Vec<MessageRow> =
            sqlx::query_as("SELECT * FROM messages ORDER BY created_at DESC LIMIT $1")
                .bind(messages_limit)
                .fetch_all(&mut *tx)
                .await?;
        let messages = message_rows.into_iter().map(Message::from).collect();

        let task_rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks ORDER BY created_at DESC")
            .fetch_all(&mut *tx)
            .await?;

        let mut tasks = Vec::with_capacity(task_rows.len());
        for row in task_rows {
            let assigned_agents = {
                let rows = sqlx::query("SELECT agent_id FROM task_assignments WHERE task_id = $1")
                    .bind(&row.id)
                    .fetch_all(&mut *tx)
                    .await?;
                rows.into_iter().map(|r| r.get("agent_id")).collect()
            };
            tasks.push(Task {
                id: row.id,
                title: row.title,
                description: row.description,
                status: TaskStatus::from_str(&row.status)?,
                priority: row.priority,
                created_by: row.created_by,
                assigned_agents,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }

        tx.commit().await?;

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
