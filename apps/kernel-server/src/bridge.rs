// apps/kernel-server/src/bridge.rs
// Purpose: State Bridge / Poller (C7): reconciles pub/sub push events with
// a pull heartbeat and forwards the results to the hub.
// Architecture: Reconciliation loop
// Dependencies: tokio, tokio-util (CancellationToken)

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::hub::Hub;
use crate::snapshot::SnapshotAssembler;

pub struct Bridge {
    bus: Arc<dyn EventBus>,
    hub: Arc<Hub>,
    snapshot: Arc<SnapshotAssembler>,
    heartbeat_interval: Duration,
}

impl Bridge {
    pub fn new(
        bus: Arc<dyn EventBus>,
        hub: Arc<Hub>,
        snapshot: Arc<SnapshotAssembler>,
        heartbeat_interval: Duration,
    ) -> Self {
        Bridge {
            bus,
            hub,
            snapshot,
            heartbeat_interval,
        }
    }

    /// Emits the first snapshot, then subscribes if possible and runs
    /// either the dual-source loop or the heartbeat-only loop until
    /// `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut last_version = -1i64;
        self.emit_snapshot_if_changed(&mut last_version).await;
        self.try_subscribe_or_degrade(last_version, cancel).await;
    }

    /// Attempts to subscribe to both channels; on success runs the
    /// dual-source loop, on failure falls back to heartbeat-only and
    /// retries the subscription once per heartbeat tick (spec.md §9 leaves
    /// the retry cadence implementation-defined; this reuses the existing
    /// timer rather than adding a second one).
    async fn try_subscribe_or_degrade(&self, last_version: i64, cancel: CancellationToken) {
        let state_changed_sub = self.bus.subscribe_state_changed().await;
        let agent_events_sub = self.bus.subscribe_agent_events().await;

        match (state_changed_sub, agent_events_sub) {
            (Some(state_changed), Some(agent_events)) => {
                self.dual_source_loop(state_changed, agent_events, last_version, cancel)
                    .await;
            }
            _ => {
                tracing::warn!("event bus subscription unavailable, running heartbeat-only");
                self.heartbeat_only_loop(last_version, cancel).await;
            }
        }
    }

    fn dual_source_loop<'a>(
        &'a self,
        mut state_changed: Box<dyn crate::bus::Subscription>,
        mut agent_events: Box<dyn crate::bus::Subscription>,
        mut last_version: i64,
        cancel: CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
            heartbeat.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("bridge cancelled, exiting dual-source loop");
                        return;
                    }
                    msg = state_changed.recv() => {
                        if msg.is_none() {
                            tracing::warn!("state_changed subscription closed, falling back to heartbeat-only");
                            return self.heartbeat_only_loop(last_version, cancel).await;
                        }
                        self.emit_snapshot_if_changed(&mut last_version).await;
                    }
                    frame = agent_events.recv() => {
                        match frame {
                            Some(frame) => self.hub.broadcast(frame).await,
                            None => {
                                tracing::warn!("agent_events subscription closed, falling back to heartbeat-only");
                                return self.heartbeat_only_loop(last_version, cancel).await;
                            }
                        }
                    }
                    _ = heartbeat.tick() => {
                        self.emit_snapshot_if_changed(&mut last_version).await;
                    }
                }
            }
        })
    }

    /// Heartbeat-only degraded loop. Retries the bus subscription once per
    /// tick; a successful retry hands control back to the dual-source loop
    /// without a restart (spec.md §9, testable property 9).
    fn heartbeat_only_loop<'a>(
        &'a self,
        mut last_version: i64,
        cancel: CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("bridge cancelled, exiting heartbeat-only loop");
                        return;
                    }
                    _ = heartbeat.tick() => {
                        self.emit_snapshot_if_changed(&mut last_version).await;

                        let state_changed_sub = self.bus.subscribe_state_changed().await;
                        let agent_events_sub = self.bus.subscribe_agent_events().await;
                        if let (Some(state_changed), Some(agent_events)) =
                            (state_changed_sub, agent_events_sub)
                        {
                            tracing::info!("event bus subscription recovered, resuming dual-source loop");
                            return self
                                .dual_source_loop(state_changed, agent_events, last_version, cancel)
                                .await;
                        }
                    }
                }
            }
        })
    }

    async fn emit_snapshot_if_changed(&self, last_version: &mut i64) {
        match self.snapshot.assemble().await {
            Ok(update) => {
                if update.version != *last_version {
                    *last_version = update.version;
                    match serde_json::to_string(&update) {
                        Ok(text) => self.hub.broadcast(text).await,
                        Err(e) => tracing::error!("failed to serialize snapshot: {}", e),
                    }
                }
            }
            Err(e) => tracing::error!("failed to assemble snapshot: {}", e),
        }
    }
}
