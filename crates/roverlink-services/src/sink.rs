//! Client write side.
//!
//! A sink never blocks. Both concrete sinks hand the packet to a per-client
//! writer task over an unbounded channel; what differs is who decides when
//! the client can take more data.
//!
//!   Message: the transport exposes its own readiness (bytes still
//!            buffered for the socket). Ready when nothing is pending.
//!   Stream:  readiness is tracked by the registry. Cleared when a write
//!            is issued, set again by the writer's completion report.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Message-framed (WebSocket).
    Message,
    /// Continuous byte stream (raw TCP).
    Stream,
}

/// One unit of outbound data: parts written back to back with nothing from
/// another packet in between. Parts are reference-counted, never copied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbound {
    parts: Vec<Bytes>,
}

impl Outbound {
    pub fn single(packet: Bytes) -> Self {
        Self {
            parts: vec![packet],
        }
    }

    pub fn from_parts(parts: Vec<Bytes>) -> Self {
        Self { parts }
    }

    pub fn push(&mut self, part: Bytes) {
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<Bytes> {
        self.parts
    }

    /// Total bytes across all parts.
    pub fn len(&self) -> usize {
        self.parts.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(Bytes::is_empty)
    }
}

impl From<Bytes> for Outbound {
    fn from(packet: Bytes) -> Self {
        Outbound::single(packet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("client connection closed")]
    Closed,
}

/// The gateway's handle on one connected client.
pub trait ClientSink: Send {
    fn kind(&self) -> TransportKind;

    /// Transport-level readiness. Only consulted for `Message` sinks.
    fn is_ready(&self) -> bool {
        true
    }

    fn write(&mut self, out: Outbound) -> Result<(), SinkError>;
}

// ── Message-framed sink ──────────────────────────────────────────────────────

/// Sink for message-framed transports. The writer task must call
/// [`PendingBytes::sent`] after each message leaves the socket.
pub struct MessageSink {
    tx: mpsc::UnboundedSender<Outbound>,
    pending: PendingBytes,
}

/// Bytes handed to a writer task and not yet flushed to the socket.
#[derive(Debug, Clone, Default)]
pub struct PendingBytes(Arc<AtomicUsize>);

impl PendingBytes {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn add(&self, n: usize) {
        self.0.fetch_add(n, Ordering::AcqRel);
    }

    pub fn sent(&self, n: usize) {
        // Saturating: a writer reporting more than was queued must not wrap.
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(cur.saturating_sub(n))
            });
    }
}

impl MessageSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>, PendingBytes) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = PendingBytes::default();
        (
            Self {
                tx,
                pending: pending.clone(),
            },
            rx,
            pending,
        )
    }
}

impl ClientSink for MessageSink {
    fn kind(&self) -> TransportKind {
        TransportKind::Message
    }

    fn is_ready(&self) -> bool {
        self.pending.get() == 0
    }

    fn write(&mut self, out: Outbound) -> Result<(), SinkError> {
        let n = out.len();
        self.pending.add(n);
        self.tx.send(out).map_err(|_| {
            self.pending.sent(n);
            SinkError::Closed
        })
    }
}

// ── Stream sink ──────────────────────────────────────────────────────────────

/// Sink for continuous byte streams. The writer task reports each
/// completed write back to the gateway; the sink itself keeps no state.
pub struct StreamSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl StreamSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ClientSink for StreamSink {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn write(&mut self, out: Outbound) -> Result<(), SinkError> {
        self.tx.send(out).map_err(|_| SinkError::Closed)
    }
}
