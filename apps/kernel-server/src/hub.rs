// apps/kernel-server/src/hub.rs
// Purpose: Hub (C5): per-client send queues and broadcast with dead-client
// eviction. Grounded on the broadcaster pattern of keeping one bounded
// mpsc sender per client in a concurrent map and sweeping failures rather
// than blocking the broadcaster on a slow reader.
// Architecture: Fan-out core
// Dependencies: dashmap, tokio::sync::mpsc, futures

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub type ClientId = u64;

/// Handed back to the connection handler on registration; the handler's
/// write pump drains `receiver` and feeds each item to the socket.
pub struct ClientHandle {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<String>,
}

struct Client {
    sender: mpsc::Sender<String>,
}

/// Owns the set of connected client sessions. All operations go through
/// `DashMap`'s own sharded locking, so register/unregister/broadcast never
/// contend on one global mutex (spec.md §4.5 only requires that each
/// individually observe a consistent membership snapshot, not a single
/// serialized loop).
pub struct Hub {
    clients: DashMap<ClientId, Client>,
    next_id: AtomicU64,
    send_buffer: usize,
}

impl Hub {
    pub fn new(send_buffer: usize) -> Self {
        Hub {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            send_buffer,
        }
    }

    /// Admits a client into the broadcast set. Returns the queue the caller
    /// reads from to get outbound frames.
    pub fn register(&self) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.send_buffer);
        self.clients.insert(id, Client { sender });
        tracing::debug!(client_id = id, "client registered");
        ClientHandle { id, receiver }
    }

    /// Removes a client and closes its send queue. Safe to call more than
    /// once for the same id; the second call is a no-op.
    pub fn unregister(&self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            tracing::debug!(client_id = id, "client unregistered");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Enqueues `frame` on every client's bounded queue. A client whose
    /// queue is full or closed is dropped from the set immediately; there
    /// is no retry; the next heartbeat snapshot catches it up if it
    /// reconnects (spec.md §4.5, §4.7).
    pub async fn broadcast(&self, frame: String) {
        let targets: Vec<(ClientId, mpsc::Sender<String>)> = self
            .clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().sender.clone()))
            .collect();

        let sends = targets.iter().map(|(id, sender)| {
            let frame = frame.clone();
            let sender = sender.clone();
            async move { (*id, sender.try_send(frame)) }
        });

        let results = join_all(sends).await;
        let mut dropped = 0u64;
        for (id, result) in results {
            if result.is_err() {
                self.clients.remove(&id);
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped_count = dropped, "evicted dead clients on broadcast");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client() {
        let hub = Hub::new(8);
        let mut a = hub.register();
        let mut b = hub.register();

        hub.broadcast("hello".to_string()).await;

        assert_eq!(a.receiver.recv().await, Some("hello".to_string()));
        assert_eq!(b.receiver.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn unregister_removes_client_from_broadcast_set() {
        let hub = Hub::new(8);
        let handle = hub.register();
        hub.unregister(handle.id);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_evicts_client_instead_of_blocking() {
        let hub = Hub::new(1);
        let mut handle = hub.register();

        hub.broadcast("first".to_string()).await;
        // Queue now holds "first" and is unread; the next broadcast
        // overflows a 1-slot queue and the client is dropped.
        hub.broadcast("second".to_string()).await;

        assert_eq!(hub.client_count(), 0);
        assert_eq!(handle.receiver.recv().await, Some("first".to_string()));
        assert_eq!(handle.receiver.recv().await, None);
    }
}
