// apps/kernel-server/src/dispatcher.rs
// Purpose: Idle-Agent Dispatcher (C9): drains each idle agent's backlog
// through the task status machine, one agent at a time under a per-agent
// advisory lock.
// Architecture: Background worker
// Dependencies: dashmap, tokio-util (CancellationToken)

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::delta::DeltaPublisher;
use crate::models::TaskStatus;
use crate::orchestration::{InvocationGoal, Orchestrator};
use crate::store::{NewMessage, Store};

/// Process-local, non-blocking per-agent locks. Advisory only: they
/// prevent two dispatcher cycles from draining the same agent
/// concurrently, but an HTTP mutation can still move the agent out from
/// under a held lock; the agent status machine and version bump remain
/// the authoritative serialization (spec.md §5).
struct AgentLocks {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl AgentLocks {
    fn new() -> Self {
        AgentLocks {
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, agent_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    delta: Arc<DeltaPublisher>,
    orchestrator: Arc<dyn Orchestrator>,
    locks: AgentLocks,
    cycle_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        delta: Arc<DeltaPublisher>,
        orchestrator: Arc<dyn Orchestrator>,
        cycle_interval: Duration,
    ) -> Self {
        Dispatcher {
            store,
            delta,
            orchestrator,
            locks: AgentLocks::new(),
            cycle_interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.cycle_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("dispatcher cancelled");
                    return;
                }
                _ = interval.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) {
        let idle_agents = match self.store.list_idle_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                tracing::error!("dispatcher failed to list idle agents: {}", e);
                return;
            }
        };

        for agent in idle_agents {
            if cancel.is_cancelled() {
                return;
            }

            let lock = self.locks.lock_for(&agent.id);
            let guard = match lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => continue, // contended; another cycle is already draining this agent
            };

            self.drain_agent(&agent.id, cancel).await;
            drop(guard);
        }
    }

    async fn drain_agent(&self, agent_id: &str, cancel: &CancellationToken) {
        let backlog = match self.store.list_backlog_tasks(agent_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!("failed to list backlog for {}: {}", agent_id, e);
                return;
            }
        };

        for task in backlog {
            if cancel.is_cancelled() {
                return; // an in-flight step is allowed to finish, but none may start
            }

            if !self.transition(&task.id, TaskStatus::InProgress).await {
                continue;
            }

            let outcome = self
                .orchestrator
                .invoke(InvocationGoal {
                    goal: task.title.clone(),
                    target_agent: Some(agent_id.to_string()),
                })
                .await;

            let (final_status, summary) = match outcome {
                Ok(outcome) if outcome.success => {
                    self.transition(&task.id, TaskStatus::Review).await;
                    (TaskStatus::Done, outcome.summary)
                }
                Ok(outcome) => (TaskStatus::Blocked, outcome.summary),
                Err(e) => (TaskStatus::Blocked, e.to_string()),
            };

            self.transition(&task.id, final_status).await;
            self.emit_summary(agent_id, &task.id, &task.title, final_status, &summary)
                .await;
        }
    }

    /// Persists the new status, bumps the version, and publishes a delta.
    /// Returns whether the transition succeeded so the caller can decide
    /// whether to proceed further down the task's lifecycle.
    async fn transition(&self, task_id: &str, status: TaskStatus) -> bool {
        let task = match self.store.set_task_status(task_id, status).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!("task {} vanished mid-drain", task_id);
                return false;
            }
            Err(e) => {
                tracing::error!("failed to transition task {}: {}", task_id, e);
                return false;
            }
        };

        if let Err(e) = self.store.bump_version().await {
            tracing::error!("failed to bump version after task transition: {}", e);
        }
        self.delta.publish_task(&task).await;
        true
    }

    async fn emit_summary(
        &self,
        agent_id: &str,
        task_id: &str,
        task_title: &str,
        final_status: TaskStatus,
        summary: &str,
    ) {
        let content = format!("[{}] {} -> {}: {}", task_id, task_title, final_status, summary);
        let message = match self
            .store
            .create_message(NewMessage {
                from_agent: agent_id.to_string(),
                to_agent: String::new(),
                content,
                message_type: "status_report".to_string(),
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("failed to record dispatcher summary message: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.bump_version().await {
            tracing::error!("failed to bump version after summary message: {}", e);
        }
        self.delta.publish_message(&message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NullEventBus;
    use crate::models::{Agent, AgentStatus, Room};
    use crate::orchestration::fake::FakeOrchestrator;
    use crate::store::memory::MemoryStore;
    use crate::store::NewTask;
    use chrono::Utc;

    fn idle_agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            role: "engineer".to_string(),
            room: Room::Desks,
            status: AgentStatus::Idle,
            current_task: String::new(),
            thought_chain: String::new(),
            tech_stack: vec![],
            avatar_color: "#000".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn successful_task_reaches_done() {
        let memory = Arc::new(MemoryStore::new());
        memory.seed_agent(idle_agent("abby"));
        let store: Arc<dyn Store> = memory;

        let task = store
            .create_task(NewTask {
                title: "write tests".into(),
                description: String::new(),
                status: TaskStatus::Backlog,
                priority: 0,
                created_by: "abby".into(),
                assigned_agents: vec!["abby".into()],
            })
            .await
            .unwrap();

        let bus: Arc<dyn EventBus> = Arc::new(NullEventBus);
        let delta = Arc::new(DeltaPublisher::new(bus));
        let dispatcher = Dispatcher::new(
            store.clone(),
            delta,
            Arc::new(FakeOrchestrator::new(true)),
            Duration::from_secs(2),
        );

        let cancel = CancellationToken::new();
        dispatcher.drain_agent("abby", &cancel).await;

        let updated = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn failed_invocation_blocks_the_task() {
        let memory = Arc::new(MemoryStore::new());
        memory.seed_agent(idle_agent("ben"));
        let store: Arc<dyn Store> = memory;

        let task = store
            .create_task(NewTask {
                title: "deploy".into(),
                description: String::new(),
                status: TaskStatus::Backlog,
                priority: 0,
                created_by: "ben".into(),
                assigned_agents: vec!["ben".into()],
            })
            .await
            .unwrap();

        let bus: Arc<dyn EventBus> = Arc::new(NullEventBus);
        let delta = Arc::new(DeltaPublisher::new(bus));
        let dispatcher = Dispatcher::new(
            store.clone(),
            delta,
            Arc::new(FakeOrchestrator::new(false)),
            Duration::from_secs(2),
        );

        let cancel = CancellationToken::new();
        dispatcher.drain_agent("ben", &cancel).await;

        let updated = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn concurrent_cycles_cannot_both_drain_the_same_agent() {
        let locks = AgentLocks::new();
        let lock = locks.lock_for("abby");
        let _held = lock.try_lock().expect("first acquire succeeds");

        let second_attempt = locks.lock_for("abby").try_lock();
        assert!(
            second_attempt.is_err(),
            "a second cycle must observe the lock contended and skip, not block or double-acquire"
        );
    }
}
