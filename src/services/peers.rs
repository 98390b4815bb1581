use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::interfaces::transport::PacketSink;

struct PeerEntry {
    connection_id: u64,
    sink: Arc<dyn PacketSink>,
}

/// Peer id -> outbound half of that peer's channel.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<String, PeerEntry>>,
    next_connection_id: AtomicU64,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the channel for `key`, replacing any previous one, and returns
    /// an id identifying this particular connection.
    pub async fn put(&self, key: &str, sink: Arc<dyn PacketSink>) -> u64 {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let mut peers = self.peers.write().await;
        if peers
            .insert(
                key.to_string(),
                PeerEntry {
                    connection_id,
                    sink,
                },
            )
            .is_some()
        {
            tracing::info!(peer = key, "replaced existing stream for peer");
        }
        connection_id
    }

    pub async fn get(&self, key: &str) -> Option<Arc<dyn PacketSink>> {
        let peers = self.peers.read().await;
        peers.get(key).map(|entry| entry.sink.clone())
    }

    pub async fn remove(&self, key: &str) -> bool {
        let mut peers = self.peers.write().await;
        peers.remove(key).is_some()
    }

    /// Removes `key` only while it still points at `connection_id`, so a late
    /// close of a replaced connection leaves the newer one alone.
    pub async fn remove_if_current(&self, key: &str, connection_id: u64) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get(key) {
            Some(entry) if entry.connection_id == connection_id => {
                peers.remove(key);
                true
            }
            _ => false,
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        let peers = self.peers.read().await;
        peers.keys().cloned().collect()
    }

    /// Empties the table and returns the keys that were in it.
    pub async fn clear(&self) -> Vec<String> {
        let mut peers = self.peers.write().await;
        peers.drain().map(|(key, _)| key).collect()
    }
}
