// apps/kernel-server/src/ws.rs
// Purpose: Connection Handler (C6): upgrades a socket, registers it with
// the hub, and runs the read/write pumps described in spec.md §4.6.
// Architecture: Transport adapter
// Dependencies: axum (ws), futures, tokio

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::hub::Hub;

const READ_SIZE_CAP: usize = 8 * 1024;

pub struct ConnectionConfig {
    pub ping_period: Duration,
    pub pong_deadline: Duration,
    pub write_deadline: Duration,
}

/// Drives one client's connection lifetime: registers with the hub, runs
/// the read pump (liveness only) and write pump (framing + ping/pong)
/// concurrently, and unregisters on either side's exit.
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, config: ConnectionConfig) {
    let handle = hub.register();
    let client_id = handle.id;
    let (mut sender, mut receiver) = socket.split();
    let mut outbox = handle.receiver;

    let write_deadline = config.write_deadline;
    let mut ping_interval = tokio::time::interval(config.ping_period);
    ping_interval.tick().await; // first tick fires immediately; discard it

    let write_pump = async {
        loop {
            tokio::select! {
                frame = outbox.recv() => {
                    match frame {
                        Some(frame) => {
                            let write = tokio::time::timeout(
                                write_deadline,
                                sender.send(WsMessage::Text(frame)),
                            )
                            .await;
                            match write {
                                Ok(Ok(())) => {}
                                Ok(Err(_)) | Err(_) => break,
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    let write = tokio::time::timeout(
                        write_deadline,
                        sender.send(WsMessage::Ping(Vec::new())),
                    )
                    .await;
                    if !matches!(write, Ok(Ok(()))) {
                        break;
                    }
                }
            }
        }
    };

    let pong_deadline = config.pong_deadline;
    let read_pump = async {
        loop {
            let next = tokio::time::timeout(pong_deadline, receiver.next()).await;
            match next {
                Ok(Some(Ok(msg))) => {
                    if frame_len(&msg) > READ_SIZE_CAP {
                        tracing::debug!(client_id, "client frame exceeded read cap, closing");
                        break;
                    }
                    if matches!(msg, WsMessage::Close(_)) {
                        break;
                    }
                    // Pong/Ping/Text/Binary all just extend liveness; content
                    // is not interpreted (spec.md §4.6: reads are liveness-only).
                }
                Ok(Some(Err(_))) | Ok(None) | Err(_) => break,
            }
        }
    };

    tokio::select! {
        _ = write_pump => {}
        _ = read_pump => {}
    }

    hub.unregister(client_id);
    tracing::debug!(client_id, "connection closed");
}

fn frame_len(msg: &WsMessage) -> usize {
    match msg {
        WsMessage::Text(t) => t.len(),
        WsMessage::Binary(b) => b.len(),
        WsMessage::Ping(p) | WsMessage::Pong(p) => p.len(),
        WsMessage::Close(_) => 0,
    }
}
