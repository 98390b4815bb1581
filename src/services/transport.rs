//! TCP realisation of the streaming RPC channel.
//!
//! Frames are a big-endian `u32` length followed by a JSON body. Every
//! connection starts with one [`OpenFrame`]; a `Stream` connection then carries
//! envelopes in both directions, unary connections carry one [`ReplyFrame`].

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::domains::frame::{Metadata, OpenFrame, ReplyFrame};
use crate::domains::message::{BtpPacket, BtpPacketData};
use crate::error::{BtpError, Result};
use crate::interfaces::transport::{DuplexChannel, PacketSink, PacketStream};

pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;
const WRITE_QUEUE_DEPTH: usize = 64;

pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        serde_json::to_vec(frame).map_err(|e| BtpError::Serialization(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            BtpError::WriteFailure(format!("frame of {} bytes is too large", payload.len()))
        })?;

    writer.write_u32(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one raw frame body. `Ok(None)` means the peer closed cleanly
/// between frames.
pub async fn read_frame_payload<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(BtpError::Decode(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame_payload(reader).await? {
        Some(payload) => serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| BtpError::Decode(e.to_string())),
        None => Ok(None),
    }
}

type WriteRequest = (BtpPacket, oneshot::Sender<Result<()>>);

/// Outbound half of a TCP stream. Writes are serialised through one task and
/// acknowledged once the frame is flushed to the socket.
pub struct TcpSink {
    tx: mpsc::Sender<WriteRequest>,
}

#[async_trait]
impl PacketSink for TcpSink {
    async fn write(&self, packet: BtpPacket) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((packet, ack_tx))
            .await
            .map_err(|_| BtpError::WriteFailure("stream is closed".to_string()))?;
        ack_rx
            .await
            .map_err(|_| BtpError::WriteFailure("stream closed before write".to_string()))?
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some((packet, ack)) = rx.recv().await {
        let result = write_frame(&mut writer, &packet)
            .await
            .map_err(|e| BtpError::WriteFailure(e.to_string()));
        let failed = result.is_err();
        let _ = ack.send(result);
        if failed {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeHeader {
    request_id: u32,
}

/// Stand-in for an envelope whose type or data could not be read. Type 0 is
/// not assigned in BTP, so the peer still gets an error for its request id.
fn unreadable_envelope(request_id: u32) -> BtpPacket {
    BtpPacket {
        request_id,
        packet_type: 0,
        data: BtpPacketData::default(),
    }
}

fn read_stream(mut reader: OwnedReadHalf) -> PacketStream {
    async_stream::stream! {
        loop {
            let payload = match read_frame_payload(&mut reader).await {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(error = %err, "stream read failed");
                    break;
                }
            };
            match serde_json::from_slice::<BtpPacket>(&payload) {
                Ok(packet) => yield packet,
                Err(err) => match serde_json::from_slice::<EnvelopeHeader>(&payload) {
                    Ok(header) => {
                        tracing::warn!(
                            request_id = header.request_id,
                            error = %err,
                            "envelope fields unreadable, answering as unknown type"
                        );
                        yield unreadable_envelope(header.request_id);
                    }
                    Err(_) => tracing::warn!(error = %err, "dropping undecodable frame"),
                },
            }
        }
    }
    .boxed()
}

/// Wraps an already-opened stream connection as a [`DuplexChannel`].
pub fn stream_channel(stream: TcpStream, metadata: Metadata) -> DuplexChannel {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
    tokio::spawn(write_loop(writer, rx));
    DuplexChannel::new(metadata, Arc::new(TcpSink { tx }), read_stream(reader))
}

pub async fn open_stream(addr: &str, metadata: Metadata) -> Result<DuplexChannel> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    write_frame(
        &mut stream,
        &OpenFrame::Stream {
            metadata: metadata.clone(),
        },
    )
    .await?;
    Ok(stream_channel(stream, metadata))
}

pub async fn unary_call(addr: &str, open: &OpenFrame) -> Result<ReplyFrame> {
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, open).await?;
    read_frame(&mut stream)
        .await?
        .ok_or_else(|| BtpError::Runtime("connection closed before reply".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn frame_roundtrip_and_clean_eof() {
        let mut buffer = Vec::new();
        let packet = BtpPacket::response(77, Vec::new());
        write_frame(&mut buffer, &packet).await.unwrap();
        assert_eq!(&buffer[..4], &((buffer.len() - 4) as u32).to_be_bytes());

        let mut reader = Cursor::new(buffer);
        let parsed: Option<BtpPacket> = read_frame(&mut reader).await.unwrap();
        assert_eq!(parsed, Some(packet));
        let end: Option<BtpPacket> = read_frame(&mut reader).await.unwrap();
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let mut reader = Cursor::new((MAX_FRAME_LEN + 1).to_be_bytes().to_vec());
        let result: Result<Option<BtpPacket>> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(BtpError::Decode(_))));
    }
}
