// apps/kernel-server/src/delta.rs
// Purpose: Delta Publisher (C4): emits DELTA_UPDATE frames on agent_events
// plus the state_changed signal after every version-bumping mutation.
// Architecture: Write-side projection
// Dependencies: serde_json

use serde::Serialize;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::models::{Agent, AgentWire, Message, MessageWire, Task, TaskWire};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Agents,
    Tasks,
    Messages,
}

#[derive(Serialize)]
struct DeltaUpdate<'a, T: Serialize> {
    #[serde(rename = "type")]
    frame_type: &'static str,
    category: Category,
    id: &'a str,
    data: T,
}

pub struct DeltaPublisher {
    bus: Arc<dyn EventBus>,
}

impl DeltaPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        DeltaPublisher { bus }
    }

    /// Publishes the delta and the state_changed signal. Best-effort: the
    /// caller has already committed the mutation, so a publish failure is
    /// swallowed here (it's surfaced as a tracing warning by the bus
    /// implementation) rather than returned as an error.
    async fn publish(&self, category: Category, id: &str, frame: String) {
        self.bus.publish_agent_event(frame).await;
        self.bus.publish_state_changed().await;
        tracing::debug!(?category, id, "published delta");
    }

    pub async fn publish_agent(&self, agent: &Agent) {
        let delta = DeltaUpdate {
            frame_type: "DELTA_UPDATE",
            category: Category::Agents,
            id: &agent.id,
            data: AgentWire::from(agent),
        };
        let frame = serde_json::to_string(&delta).expect("delta frame always serializes");
        self.publish(Category::Agents, &agent.id, frame).await;
    }

    pub async fn publish_task(&self, task: &Task) {
        let delta = DeltaUpdate {
            frame_type: "DELTA_UPDATE",
            category: Category::Tasks,
            id: &task.id,
            data: TaskWire::from(task),
        };
        let frame = serde_json::to_string(&delta).expect("delta frame always serializes");
        self.publish(Category::Tasks, &task.id, frame).await;
    }

    pub async fn publish_message(&self, message: &Message) {
        let delta = DeltaUpdate {
            frame_type: "DELTA_UPDATE",
            category: Category::Messages,
            id: &message.id,
            data: MessageWire::from(message),
        };
        let frame = serde_json::to_string(&delta).expect("delta frame always serializes");
        self.publish(Category::Messages, &message.id, frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NullEventBus;
    use crate::models::{AgentStatus, Room};
    use chrono::Utc;

    #[tokio::test]
    async fn publish_agent_does_not_panic_against_a_degraded_bus() {
        let publisher = DeltaPublisher::new(Arc::new(NullEventBus));
        let agent = Agent {
            id: "abby".into(),
            name: "Abby".into(),
            role: "engineer".into(),
            room: Room::Desks,
            status: AgentStatus::Idle,
            current_task: String::new(),
            thought_chain: String::new(),
            tech_stack: vec![],
            avatar_color: "#000".into(),
            updated_at: Utc::now(),
        };
        publisher.publish_agent(&agent).await;
    }
}
