#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;

use btp_tunnel::domains::frame::{Metadata, ACCOUNT_ID_KEY};
use btp_tunnel::error::{BtpError, Result};
use btp_tunnel::interfaces::transport::DuplexChannel;
use btp_tunnel::services::memory::channel_pair;
use btp_tunnel::{AccountHooks, BtpPacket, DataHandler, Role, SessionEngine};

pub const THANK_YOU: &[u8] = b"thank you";

/// Stand-in for a serialized ILP prepare packet.
pub fn prepare_packet() -> Bytes {
    Bytes::from((0u8..37).collect::<Vec<u8>>())
}

pub struct FixedHandler {
    pub reply: Bytes,
    pub seen: Mutex<Vec<(String, Bytes)>>,
}

impl FixedHandler {
    pub fn new(reply: &[u8]) -> Self {
        Self {
            reply: Bytes::copy_from_slice(reply),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<(String, Bytes)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataHandler for FixedHandler {
    async fn handle_data(&self, from: &str, data: Bytes) -> Result<Bytes> {
        self.seen.lock().unwrap().push((from.to_string(), data));
        Ok(self.reply.clone())
    }
}

pub struct FailingHandler;

#[async_trait]
impl DataHandler for FailingHandler {
    async fn handle_data(&self, _from: &str, _data: Bytes) -> Result<Bytes> {
        Err(BtpError::Runtime("ledger password rejected".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl AccountHooks for RecordingHooks {
    fn on_account_added(&self, id: &str, info: &Value) {
        self.record(format!("added:{id}:{info}"));
    }

    fn on_account_removed(&self, id: &str) {
        self.record(format!("removed:{id}"));
    }

    fn on_connection_changed(&self, id: &str, is_connected: bool) {
        self.record(format!("connection:{id}:{is_connected}"));
    }
}

pub fn account_metadata(account_id: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(ACCOUNT_ID_KEY.to_string(), account_id.to_string());
    metadata
}

/// Registers a new in-memory peer `account_id` on a listener engine and
/// returns the peer's end of the channel.
pub async fn attach_raw_peer(engine: &Arc<SessionEngine>, account_id: &str) -> DuplexChannel {
    let (listener_end, peer_end) = channel_pair(account_metadata(account_id), Metadata::new());
    let registered = engine.register_peer(listener_end).await.unwrap();
    assert_eq!(registered, account_id);
    peer_end
}

/// Wires a dialer engine to a listener engine through an in-memory channel.
pub async fn link(listener: &Arc<SessionEngine>, dialer: &Arc<SessionEngine>, account_id: &str) {
    assert_eq!(listener.role(), Role::Listener);
    assert_eq!(dialer.role(), Role::Dialer);
    let (listener_end, dialer_end) = channel_pair(account_metadata(account_id), Metadata::new());
    listener.register_peer(listener_end).await.unwrap();
    dialer.attach_upstream(dialer_end).await;
}

pub async fn next_packet(channel: &mut DuplexChannel) -> BtpPacket {
    tokio::time::timeout(Duration::from_secs(5), channel.inbound.next())
        .await
        .expect("timed out waiting for packet")
        .expect("channel closed")
}

pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
