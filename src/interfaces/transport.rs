use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domains::frame::Metadata;
use crate::domains::message::BtpPacket;
use crate::error::Result;

/// Outbound half of a duplex channel. `write` resolves once the packet is
/// accepted for transmission, not once the peer has processed it.
#[async_trait]
pub trait PacketSink: Send + Sync {
    async fn write(&self, packet: BtpPacket) -> Result<()>;
}

/// Inbound half. The end of the stream is the channel's close signal.
pub type PacketStream = BoxStream<'static, BtpPacket>;

pub struct DuplexChannel {
    pub metadata: Metadata,
    pub sink: Arc<dyn PacketSink>,
    pub inbound: PacketStream,
}

impl DuplexChannel {
    pub fn new(metadata: Metadata, sink: Arc<dyn PacketSink>, inbound: PacketStream) -> Self {
        Self {
            metadata,
            sink,
            inbound,
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
