// apps/kernel-server/src/snapshot.rs
// Purpose: Snapshot Assembler (C3): builds the STATE_UPDATE frame from the
// store's coherent read.
// Architecture: Read-side projection
// Dependencies: serde_json

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{AgentWire, MessageWire, TaskWire};
use crate::store::Store;

/// `STATE_UPDATE` wire frame. `agents` keys by agent id as documented in
/// spec.md §4.3; `messages`/`tasks` are omitted entirely when empty rather
/// than serialized as `[]`.
#[derive(Debug, Serialize)]
pub struct StateUpdate {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub agents: BTreeMap<String, AgentWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskWire>,
    pub version: i64,
}

pub struct SnapshotAssembler {
    store: Arc<dyn Store>,
    messages_limit: i64,
}

impl SnapshotAssembler {
    pub fn new(store: Arc<dyn Store>, messages_limit: i64) -> Self {
        SnapshotAssembler {
            store,
            messages_limit,
        }
    }

    /// Reads the current coherent snapshot and renders it as a `StateUpdate`.
    /// Does not mutate the store; repeated calls at the same version need
    /// not be byte-identical (spec.md §4.3).
    pub async fn assemble(&self) -> Result<StateUpdate, StoreError> {
        let (snapshot, version) = self.store.get_full_state(self.messages_limit).await?;

        let agents = snapshot
            .agents
            .iter()
            .map(|a| (a.id.clone(), AgentWire::from(a)))
            .collect();
        let messages = snapshot.messages.iter().map(MessageWire::from).collect();
        let tasks = snapshot.tasks.iter().map(TaskWire::from).collect();

        Ok(StateUpdate {
            frame_type: "STATE_UPDATE",
            agents,
            messages,
            tasks,
            version,
        })
    }

    /// Renders the frame as the text that goes out over the wire.
    pub async fn assemble_text(&self) -> Result<String, StoreError> {
        let update = self.assemble().await?;
        Ok(serde_json::to_string(&update).unwrap_or_else(|_| {
            serde_json::to_string(&Value::Null).expect("null always serializes")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn omits_empty_collections() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let assembler = SnapshotAssembler::new(store, 20);
        let text = assembler.assemble_text().await.unwrap();
        assert!(!text.contains("\"messages\""));
        assert!(!text.contains("\"tasks\""));
        assert!(text.contains("\"type\":\"STATE_UPDATE\""));
    }
}
