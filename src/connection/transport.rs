// src/connection/transport.rs

//! Framed packet transports shared by client and backend sockets.

use crate::core::ProxyError;
use crate::core::protocol::PacketCodec;
use bytes::Bytes;
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The read half of a transport, yielding raw packet bodies.
pub type PacketStream = FramedRead<BoxedReader, PacketCodec>;

/// Splits any byte stream into a framed packet reader and a shared packet writer.
pub fn split<T>(io: T) -> (PacketStream, PacketSink)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    let reader: BoxedReader = Box::new(reader);
    (
        FramedRead::new(reader, PacketCodec),
        PacketSink::new(Box::new(writer)),
    )
}

/// The write half of a transport.
///
/// Several tasks write to the same peer (a pump, the switch protocol, teardown), so
/// writes are serialized by an async mutex. Once closed, further writes are dropped.
pub struct PacketSink {
    inner: Mutex<FramedWrite<BoxedWriter, PacketCodec>>,
    open: AtomicBool,
}

impl std::fmt::Debug for PacketSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSink")
            .field("open", &self.is_open())
            .finish()
    }
}

impl PacketSink {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Mutex::new(FramedWrite::new(writer, PacketCodec)),
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Writes one packet and flushes it.
    pub async fn send(&self, packet: Bytes) -> Result<(), ProxyError> {
        let mut framed = self.inner.lock().await;
        if !self.is_open() {
            trace!("Dropping a {}-byte packet for a closed transport", packet.len());
            return Ok(());
        }
        framed.send(packet).await
    }

    /// Writes several packets in order with a single flush at the end.
    pub async fn send_all(&self, packets: Vec<Bytes>) -> Result<(), ProxyError> {
        if packets.is_empty() {
            return Ok(());
        }
        let mut framed = self.inner.lock().await;
        if !self.is_open() {
            trace!("Dropping {} queued packet(s) for a closed transport", packets.len());
            return Ok(());
        }
        for packet in packets {
            framed.feed(packet).await?;
        }
        framed.flush().await
    }

    /// Flushes and shuts down the write side. Safe to call more than once.
    pub async fn close(&self) {
        let mut framed = self.inner.lock().await;
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = framed.close().await {
            debug!("Error while closing transport: {}", e);
        }
    }
}
