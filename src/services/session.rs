use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use rand_core::{OsRng, RngCore};
use tokio::task::JoinHandle;

use crate::domains::frame::ACCOUNT_ID_KEY;
use crate::domains::message::{BtpErrorInfo, BtpPacket, BtpPacketData, MessageType, SubProtocol};
use crate::error::{BtpError, Result};
use crate::interfaces::handlers::{AccountHooks, DataHandler};
use crate::interfaces::transport::DuplexChannel;
use crate::protocol_data::{decode_protocol_data, ilp_protocol_data, ILP_PROTOCOL};
use crate::services::pending::PendingCalls;
use crate::services::peers::PeerTable;

pub const SERVER_STREAM_KEY: &str = "server";
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(35_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Listener,
    Dialer,
}

/// BTP state machine for one transport endpoint. Owns the peer table and the
/// pending-call registry; nothing is shared between engines.
pub struct SessionEngine {
    role: Role,
    peers: PeerTable,
    pending: PendingCalls,
    data_handler: Option<Arc<dyn DataHandler>>,
    account_hooks: Option<Arc<dyn AccountHooks>>,
    response_timeout: Duration,
}

impl SessionEngine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            peers: PeerTable::new(),
            pending: PendingCalls::new(),
            data_handler: None,
            account_hooks: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_data_handler(mut self, handler: Arc<dyn DataHandler>) -> Self {
        self.data_handler = Some(handler);
        self
    }

    pub fn with_account_hooks(mut self, hooks: Arc<dyn AccountHooks>) -> Self {
        self.account_hooks = Some(hooks);
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    pub fn account_hooks(&self) -> Option<&Arc<dyn AccountHooks>> {
        self.account_hooks.as_ref()
    }

    pub async fn peer_ids(&self) -> Vec<String> {
        self.peers.keys().await
    }

    /// Listener side: keys the channel by the `accountId` connection metadata.
    pub async fn register_peer(self: &Arc<Self>, channel: DuplexChannel) -> Result<String> {
        let peer_id = channel
            .metadata_value(ACCOUNT_ID_KEY)
            .map(str::to_string)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                BtpError::Runtime(format!("stream opened without {ACCOUNT_ID_KEY} metadata"))
            })?;
        tracing::info!(peer = %peer_id, "peer stream registered");
        self.attach_channel(&peer_id, channel).await;
        Ok(peer_id)
    }

    /// Dialer side: the single upstream channel always lives under `"server"`.
    pub async fn attach_upstream(self: &Arc<Self>, channel: DuplexChannel) -> JoinHandle<()> {
        self.attach_channel(SERVER_STREAM_KEY, channel).await
    }

    /// Stores the channel and starts consuming its inbound packets. Messages
    /// are served on their own tasks so one slow handler does not hold up the
    /// packets behind it; everything else is handled in arrival order.
    pub async fn attach_channel(
        self: &Arc<Self>,
        peer_id: &str,
        channel: DuplexChannel,
    ) -> JoinHandle<()> {
        let DuplexChannel {
            sink, mut inbound, ..
        } = channel;
        let connection_id = self.peers.put(peer_id, sink).await;
        let engine = self.clone();
        let peer_id = peer_id.to_string();

        tokio::spawn(async move {
            while let Some(packet) = inbound.next().await {
                if packet.message_type() == Some(MessageType::Message) {
                    let engine = engine.clone();
                    let from = peer_id.clone();
                    tokio::spawn(async move {
                        engine.handle_incoming(&from, packet).await;
                    });
                } else {
                    engine.handle_incoming(&peer_id, packet).await;
                }
            }
            engine.channel_closed(&peer_id, connection_id).await;
        })
    }

    async fn channel_closed(&self, peer_id: &str, connection_id: u64) {
        if !self.peers.remove_if_current(peer_id, connection_id).await {
            return;
        }
        match self.role {
            Role::Listener => {
                tracing::info!(peer = %peer_id, "peer stream closed");
                if let Some(hooks) = &self.account_hooks {
                    hooks.on_account_removed(peer_id);
                }
            }
            Role::Dialer => {
                tracing::warn!(
                    pending = self.pending.len(),
                    "upstream stream closed; outstanding calls will time out"
                );
            }
        }
    }

    /// Runs one inbound packet to completion. Failures are turned into an
    /// Error reply to the sender and never escape.
    pub async fn handle_incoming(&self, from: &str, packet: BtpPacket) {
        let request_id = packet.request_id;
        tracing::debug!(
            peer = %from,
            request_id,
            packet_type = %packet.type_name(),
            "received btp packet"
        );

        let reply = match self.dispatch(from, packet).await {
            Ok(None) => return,
            Ok(Some(protocol_data)) => BtpPacket::response(request_id, protocol_data),
            Err(err) => {
                tracing::warn!(peer = %from, request_id, error = %err, "error processing btp packet");
                BtpPacket::error(request_id, BtpErrorInfo::for_dispatch_error(&err))
            }
        };

        if let Err(err) = self.send_packet(from, reply).await {
            tracing::warn!(peer = %from, request_id, error = %err, "unable to send btp reply");
        }
    }

    async fn dispatch(&self, from: &str, packet: BtpPacket) -> Result<Option<Vec<SubProtocol>>> {
        let BtpPacket {
            request_id,
            packet_type,
            data,
        } = packet;

        match MessageType::try_from(packet_type)? {
            MessageType::Response => {
                self.pending.resolve(request_id, data);
                Ok(None)
            }
            MessageType::Error => {
                self.pending.fail(request_id, data);
                Ok(None)
            }
            MessageType::Prepare | MessageType::Fulfill | MessageType::Reject => {
                Err(BtpError::UnsupportedPacketType(packet_type))
            }
            MessageType::Transfer => Ok(Some(Vec::new())),
            MessageType::Message => self.handle_message(from, data).await.map(Some),
        }
    }

    async fn handle_message(&self, from: &str, data: BtpPacketData) -> Result<Vec<SubProtocol>> {
        let decoded = decode_protocol_data(&data.protocol_data)?;
        let handler = self
            .data_handler
            .as_ref()
            .ok_or(BtpError::NoHandlerRegistered)?;

        let ilp = decoded.ilp.unwrap_or_default();
        let response = AssertUnwindSafe(handler.handle_data(from, ilp))
            .catch_unwind()
            .await
            .map_err(|_| BtpError::HandlerFailure("data handler panicked".to_string()))?
            .map_err(|e| BtpError::HandlerFailure(e.to_string()))?;

        Ok(ilp_protocol_data(response))
    }

    fn stream_key<'a>(&self, to: &'a str) -> &'a str {
        match self.role {
            Role::Listener => to,
            Role::Dialer => SERVER_STREAM_KEY,
        }
    }

    pub async fn send_packet(&self, to: &str, packet: BtpPacket) -> Result<()> {
        let key = self.stream_key(to);
        let sink = self
            .peers
            .get(key)
            .await
            .ok_or_else(|| BtpError::PeerNotFound(key.to_string()))?;
        tracing::debug!(
            peer = %key,
            request_id = packet.request_id,
            packet_type = %packet.type_name(),
            "sending btp packet"
        );
        sink.write(packet).await
    }

    /// Sends a request and waits for the correlated Response or Error. The
    /// deadline starts before the write, so a stalled write also times out.
    pub async fn call(&self, to: &str, packet: BtpPacket) -> Result<BtpPacketData> {
        let key = self.stream_key(to);
        let sink = self
            .peers
            .get(key)
            .await
            .ok_or_else(|| BtpError::PeerNotFound(key.to_string()))?;

        let request_id = packet.request_id;
        let pending = self.pending.register(request_id, self.response_timeout)?;
        tracing::debug!(
            peer = %key,
            request_id,
            packet_type = %packet.type_name(),
            "sending btp request"
        );

        match tokio::time::timeout_at(pending.deadline(), sink.write(packet)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(BtpError::Timeout(request_id)),
        }

        pending.wait().await
    }

    /// Sends `payload` as the `ilp` sub-protocol of a Message and returns the
    /// `ilp` payload of the reply (empty when the reply carries none).
    pub async fn send_data(&self, payload: Bytes, peer_id: Option<&str>) -> Result<Bytes> {
        let to = match (self.role, peer_id) {
            (Role::Listener, Some(peer_id)) => peer_id,
            (Role::Listener, None) => {
                return Err(BtpError::Config(
                    "a peer id is required to send from a listener".to_string(),
                ))
            }
            (Role::Dialer, _) => SERVER_STREAM_KEY,
        };

        let packet = BtpPacket::message(self.next_request_id(), ilp_protocol_data(payload));
        let response = self.call(to, packet).await?;

        Ok(response
            .protocol(ILP_PROTOCOL)
            .map(|protocol| protocol.data.clone())
            .unwrap_or_default())
    }

    fn next_request_id(&self) -> u32 {
        loop {
            let request_id = OsRng.next_u32();
            if !self.pending.contains(request_id) {
                return request_id;
            }
        }
    }

    /// Drops every stream. A listener reports each dropped peer through
    /// `on_account_removed` here, since the read loops find the table empty.
    pub async fn close_all(&self) {
        let closed = self.peers.clear().await;
        if self.role != Role::Listener {
            return;
        }
        if let Some(hooks) = &self.account_hooks {
            for peer_id in &closed {
                tracing::info!(peer = %peer_id, "peer stream closed locally");
                hooks.on_account_removed(peer_id);
            }
        }
    }
}
