// apps/kernel-server/src/orchestration.rs
// Purpose: The external orchestration collaborator, modeled as a trait so
// the worker and dispatcher are testable without a live agent service.
// Architecture: Outbound port
// Dependencies: reqwest, async-trait, serde_json

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct InvocationGoal {
    pub goal: String,
    pub target_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvocationOutcome {
    pub success: bool,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("upstream request failed: {0}")]
    Request(String),
}

/// The opaque LLM-backed reasoning graph. The core only needs to hand it a
/// goal and learn whether it succeeded; everything else about how it
/// reasons is out of scope (spec.md §1).
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn invoke(&self, goal: InvocationGoal) -> Result<InvocationOutcome, OrchestrationError>;
}

/// HTTP implementation, mirroring the teacher's pattern of POSTing a JSON
/// payload to a configured base URL and deserializing the JSON response.
pub struct HttpOrchestrator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrchestrator {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a bounded timeout");
        HttpOrchestrator { client, base_url }
    }
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    async fn invoke(&self, goal: InvocationGoal) -> Result<InvocationOutcome, OrchestrationError> {
        let url = format!("{}/invoke", self.base_url.trim_end_matches('/'));
        tracing::debug!(url = %url, "invoking orchestration collaborator");

        let response = self
            .client
            .post(&url)
            .json(&goal)
            .send()
            .await
            .map_err(|e| OrchestrationError::Request(e.to_string()))?;

        response
            .json::<InvocationOutcome>()
            .await
            .map_err(|e| OrchestrationError::Request(e.to_string()))
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Always returns the configured outcome; used by worker/dispatcher
    /// tests that don't need a live HTTP endpoint.
    pub struct FakeOrchestrator {
        pub succeed: AtomicBool,
    }

    impl FakeOrchestrator {
        pub fn new(succeed: bool) -> Self {
            FakeOrchestrator {
                succeed: AtomicBool::new(succeed),
            }
        }
    }

    #[async_trait]
    impl Orchestrator for FakeOrchestrator {
        async fn invoke(
            &self,
            goal: InvocationGoal,
        ) -> Result<InvocationOutcome, OrchestrationError> {
            Ok(InvocationOutcome {
                success: self.succeed.load(Ordering::SeqCst),
                summary: format!("handled: {}", goal.goal),
            })
        }
    }
}
