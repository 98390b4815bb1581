use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::domains::frame::Metadata;
use crate::domains::message::BtpPacket;
use crate::error::{BtpError, Result};
use crate::interfaces::transport::{DuplexChannel, PacketSink, PacketStream};

pub struct MemorySink {
    tx: mpsc::UnboundedSender<BtpPacket>,
}

#[async_trait]
impl PacketSink for MemorySink {
    async fn write(&self, packet: BtpPacket) -> Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| BtpError::WriteFailure("in-memory channel closed".to_string()))
    }
}

fn receiver_stream(mut rx: mpsc::UnboundedReceiver<BtpPacket>) -> PacketStream {
    async_stream::stream! {
        while let Some(packet) = rx.recv().await {
            yield packet;
        }
    }
    .boxed()
}

/// Two connected in-process channel ends, each exposing the metadata given
/// for it. Dropping one end closes the other's inbound stream.
pub fn channel_pair(
    first_metadata: Metadata,
    second_metadata: Metadata,
) -> (DuplexChannel, DuplexChannel) {
    let (to_second, from_first) = mpsc::unbounded_channel();
    let (to_first, from_second) = mpsc::unbounded_channel();

    let first = DuplexChannel::new(
        first_metadata,
        Arc::new(MemorySink { tx: to_second }),
        receiver_stream(from_second),
    );
    let second = DuplexChannel::new(
        second_metadata,
        Arc::new(MemorySink { tx: to_first }),
        receiver_stream(from_first),
    );
    (first, second)
}
