// apps/kernel-server/src/worker.rs
// Purpose: Task Queue Worker (C8): reads devswarm:task_queue via a
// consumer group, invokes the orchestration collaborator, and acks.
// Architecture: Background consumer
// Dependencies: serde_json, tokio-util (CancellationToken)

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::orchestration::{InvocationGoal, Orchestrator};
use crate::store::Store;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuedGoal {
    goal: String,
    #[serde(default)]
    target_agent: Option<String>,
}

pub struct TaskQueueWorker {
    bus: Arc<dyn EventBus>,
    store: Arc<dyn Store>,
    orchestrator: Arc<dyn Orchestrator>,
    consumer_name: String,
    block_timeout: Duration,
}

impl TaskQueueWorker {
    pub fn new(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn Store>,
        orchestrator: Arc<dyn Orchestrator>,
        consumer_name: String,
    ) -> Self {
        TaskQueueWorker {
            bus,
            store,
            orchestrator,
            consumer_name,
            block_timeout: Duration::from_secs(5),
        }
    }

    /// Polls the stream until cancelled. Every delivery is acked exactly
    /// once regardless of outcome; the goal producer owns retry policy
    /// (spec.md §4.8); a failed invocation is recorded to the activity log
    /// instead of being redelivered.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let delivery = tokio::select! {
                _ = cancel.cancelled() => return,
                delivery = self.bus.read_task(&self.consumer_name, self.block_timeout) => delivery,
            };

            let Some(delivery) = delivery else {
                continue;
            };

            self.process(&delivery.payload).await;
            self.bus.ack_task(&delivery.id).await;
        }
    }

    async fn process(&self, payload: &str) {
        let goal = match serde_json::from_str::<QueuedGoal>(payload) {
            Ok(goal) => goal,
            Err(e) => {
                tracing::warn!("dropping unparseable task_queue payload: {}", e);
                return;
            }
        };

        let target_agent = goal.target_agent.clone().unwrap_or_default();
        let outcome = self
            .orchestrator
            .invoke(InvocationGoal {
                goal: goal.goal.clone(),
                target_agent: goal.target_agent,
            })
            .await;

        match outcome {
            Ok(outcome) if outcome.success => {
                tracing::debug!(goal = %goal.goal, "orchestration invocation succeeded");
            }
            Ok(outcome) => {
                self.log_failure(&target_agent, &goal.goal, &outcome.summary)
                    .await;
            }
            Err(e) => {
                self.log_failure(&target_agent, &goal.goal, &e.to_string())
                    .await;
            }
        }
    }

    async fn log_failure(&self, agent_id: &str, goal: &str, detail: &str) {
        let details = serde_json::json!({ "goal": goal, "error": detail });
        if let Err(e) = self.store.log_activity(agent_id, "task_queue_failure", details).await {
            tracing::error!("failed to log task_queue failure: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NullEventBus;
    use crate::orchestration::fake::FakeOrchestrator;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn failed_invocation_is_logged_not_requeued() {
        let store = Arc::new(MemoryStore::new());
        let worker = TaskQueueWorker::new(
            Arc::new(NullEventBus),
            store.clone(),
            Arc::new(FakeOrchestrator::new(false)),
            "worker-1".to_string(),
        );

        worker
            .process(r#"{"goal":"refactor billing","targetAgent":"abby"}"#)
            .await;

        let activity = store.list_activity(10).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].action, "task_queue_failure");
    }

    #[tokio::test]
    async fn unparseable_payload_is_dropped_without_panicking() {
        let store = Arc::new(MemoryStore::new());
        let worker = TaskQueueWorker::new(
            Arc::new(NullEventBus),
            store.clone(),
            Arc::new(FakeOrchestrator::new(true)),
            "worker-1".to_string(),
        );
        worker.process("not json").await;
        assert!(store.list_activity(10).await.unwrap().is_empty());
    }
}
