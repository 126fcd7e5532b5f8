// src/core/queue.rs

//! An unbounded FIFO of encoded packets waiting to be injected into a stream.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A multi-producer, single-consumer packet buffer.
///
/// Producers push from any task without blocking. The owning pump drains it before
/// every packet it forwards, so injected packets always precede the packet that
/// triggered the drain. There is no capacity bound and no backpressure.
#[derive(Debug, Default)]
pub struct PacketQueue {
    inner: Mutex<VecDeque<Bytes>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, packet: Bytes) {
        self.inner.lock().push_back(packet);
    }

    /// Takes everything currently queued, in enqueue order.
    ///
    /// Packets pushed after the call starts are left for the next drain.
    pub fn drain(&self) -> Vec<Bytes> {
        let mut guard = self.inner.lock();
        guard.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
