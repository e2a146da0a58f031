//! In-memory registry for live STOMP connections and their subscriptions.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use cp_protocol::Frame;

/// Channel sender that pushes frames to a connection's writer task.
pub type FrameSender = mpsc::UnboundedSender<Frame>;

/// One connected STOMP session.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub peer_id: Uuid,
    pub tx: FrameSender,
    /// subscription id → destination
    pub subscriptions: HashMap<String, String>,
}

/// Central registry shared across all WebSocket handler tasks.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: DashMap<Uuid, PeerConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    // ─── Connection lifecycle ────────────────────────────────

    pub fn register(&self, peer_id: Uuid, tx: FrameSender) {
        self.peers.insert(
            peer_id,
            PeerConnection {
                peer_id,
                tx,
                subscriptions: HashMap::new(),
            },
        );
        tracing::info!(%peer_id, peers = self.peers.len(), "STOMP session registered");
    }

    /// Remove a connection and every subscription it held.
    pub fn unregister(&self, peer_id: &Uuid) {
        if let Some((_, peer)) = self.peers.remove(peer_id) {
            tracing::info!(
                %peer_id,
                subscriptions = peer.subscriptions.len(),
                "STOMP session unregistered"
            );
        }
    }

    // ─── Subscriptions ───────────────────────────────────────

    /// Record a subscription. Returns `false` if the id is already in use
    /// on this connection or the connection is unknown.
    pub fn subscribe(&self, peer_id: &Uuid, sub_id: &str, destination: &str) -> bool {
        let Some(mut peer) = self.peers.get_mut(peer_id) else {
            return false;
        };
        if peer.subscriptions.contains_key(sub_id) {
            return false;
        }
        peer.subscriptions
            .insert(sub_id.to_string(), destination.to_string());
        tracing::debug!(%peer_id, %sub_id, %destination, "Subscribed");
        true
    }

    /// Drop a subscription, returning its destination.
    pub fn unsubscribe(&self, peer_id: &Uuid, sub_id: &str) -> Option<String> {
        let destination = self.peers.get_mut(peer_id)?.subscriptions.remove(sub_id)?;
        tracing::debug!(%peer_id, %sub_id, %destination, "Unsubscribed");
        Some(destination)
    }

    // ─── Fan-out ─────────────────────────────────────────────

    /// Send `body` as a MESSAGE to every subscription on `destination`.
    /// Returns the number of frames queued. Connections whose writer is
    /// gone are dropped.
    pub fn publish(&self, destination: &str, body: &str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for peer in self.peers.iter() {
            for (sub_id, dest) in &peer.subscriptions {
                if dest != destination {
                    continue;
                }
                let message_id = Uuid::new_v4().to_string();
                let frame = Frame::message(destination, sub_id, &message_id, body);
                if peer.tx.send(frame).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(peer.peer_id);
                    break;
                }
            }
        }
        for peer_id in dead {
            self.unregister(&peer_id);
        }
        tracing::debug!(%destination, delivered, "Published");
        delivered
    }

    // ─── Stats ───────────────────────────────────────────────

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.peers.iter().map(|p| p.subscriptions.len()).sum()
    }
}
