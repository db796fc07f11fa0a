//! Connection registry and backpressure-aware broadcaster.
//!
//! Admission policy is drop-newest: a client that is not ready is skipped
//! and counted as missed. Nothing is queued on its behalf; it will get
//! whatever the latest state is once it catches up.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::sink::{ClientSink, Outbound, SinkError, TransportKind};

pub type ClientId = u64;

/// Snapshot of connected clients shared with the API.
pub type ClientTable = Arc<DashMap<ClientId, ClientInfo>>;

/// Client ids, unique across both transports.
#[derive(Debug, Clone, Default)]
pub struct ClientIdGen(Arc<AtomicU64>);

impl ClientIdGen {
    pub fn next(&self) -> ClientId {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

struct ClientEntry {
    peer: String,
    sink: Box<dyn ClientSink>,
    /// Stream writes issued and not yet completed.
    in_flight: usize,
    bytes_sent: u64,
    missed: u64,
    connected_at: Instant,
}

impl ClientEntry {
    fn is_ready(&self) -> bool {
        match self.sink.kind() {
            TransportKind::Message => self.sink.is_ready(),
            TransportKind::Stream => self.in_flight == 0,
        }
    }

    /// Override skips the readiness check for message sinks only. A stream
    /// connection never has two writes outstanding.
    fn accepts(&self, override_ready: bool) -> bool {
        match self.sink.kind() {
            TransportKind::Message => override_ready || self.sink.is_ready(),
            TransportKind::Stream => self.in_flight == 0,
        }
    }
}

/// Read-only view of one client, for the API.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer: String,
    pub transport: TransportKind,
    pub ready: bool,
    pub bytes_sent: u64,
    pub missed: u64,
    pub connected_secs: u64,
}

/// Result of one broadcast call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub skipped: usize,
    /// Clients whose write failed. They have already been removed.
    pub dropped: Vec<ClientId>,
}

#[derive(Default)]
pub struct Registry {
    clients: BTreeMap<ClientId, ClientEntry>,
    period_bytes: u64,
    missed: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ClientId, peer: impl Into<String>, sink: Box<dyn ClientSink>) {
        let peer = peer.into();
        tracing::info!(client = id, %peer, transport = ?sink.kind(), "client registered");
        self.clients.insert(
            id,
            ClientEntry {
                peer,
                sink,
                in_flight: 0,
                bytes_sent: 0,
                missed: 0,
                connected_at: Instant::now(),
            },
        );
    }

    /// Returns false if the client was not registered.
    pub fn unregister(&mut self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            tracing::info!(client = id, "client unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn is_ready(&self, id: ClientId) -> bool {
        self.clients.get(&id).is_some_and(ClientEntry::is_ready)
    }

    /// True iff any client can take data now. Callers skip encoding when false.
    pub fn at_least_one_ready(&self) -> bool {
        self.clients.values().any(ClientEntry::is_ready)
    }

    /// True iff every client can take data now. Vacuously true when empty.
    pub fn all_ready(&self) -> bool {
        self.clients.values().all(ClientEntry::is_ready)
    }

    pub fn broadcast(&mut self, out: &Outbound, override_ready: bool) -> BroadcastReport {
        self.broadcast_where(out, override_ready, |_| true)
    }

    /// Broadcast to the clients selected by `filter`. Unselected clients are
    /// neither written to nor counted as missed.
    pub fn broadcast_where(
        &mut self,
        out: &Outbound,
        override_ready: bool,
        filter: impl Fn(ClientId) -> bool,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (&id, entry) in self.clients.iter_mut() {
            if !filter(id) {
                continue;
            }
            if !entry.accepts(override_ready) {
                entry.missed += 1;
                self.missed += 1;
                report.skipped += 1;
                tracing::trace!(client = id, "client not ready, packet dropped");
                continue;
            }
            match Self::write_entry(entry, out.clone()) {
                Ok(Some(n)) => {
                    self.period_bytes += n;
                    report.sent += 1;
                }
                Ok(None) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(client = id, error = %e, "write failed, dropping client");
                    report.dropped.push(id);
                }
            }
        }
        for id in &report.dropped {
            self.clients.remove(id);
        }
        report
    }

    /// Write to one client regardless of readiness. Used for catch-up.
    /// A failed client is removed.
    pub fn send_to(&mut self, id: ClientId, out: Outbound) -> Result<(), SinkError> {
        let entry = self.clients.get_mut(&id).ok_or(SinkError::Closed)?;
        match Self::write_entry(entry, out) {
            Ok(Some(n)) => {
                self.period_bytes += n;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::warn!(client = id, error = %e, "write failed, dropping client");
                self.clients.remove(&id);
                Err(e)
            }
        }
    }

    /// Returns the bytes to account now: message sinks count at send time,
    /// stream sinks count on completion.
    fn write_entry(entry: &mut ClientEntry, out: Outbound) -> Result<Option<u64>, SinkError> {
        let n = out.len() as u64;
        match entry.sink.kind() {
            TransportKind::Message => {
                entry.sink.write(out)?;
                entry.bytes_sent += n;
                Ok(Some(n))
            }
            TransportKind::Stream => {
                entry.sink.write(out)?;
                entry.in_flight += 1;
                Ok(None)
            }
        }
    }

    /// A stream client's writer finished one write of `bytes` bytes.
    pub fn write_completed(&mut self, id: ClientId, bytes: usize) {
        if let Some(entry) = self.clients.get_mut(&id) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.bytes_sent += bytes as u64;
            self.period_bytes += bytes as u64;
        }
    }

    /// Bytes accounted since the last call.
    pub fn take_period_bytes(&mut self) -> u64 {
        std::mem::take(&mut self.period_bytes)
    }

    pub fn missed(&self) -> u64 {
        self.missed
    }

    pub fn reset_missed(&mut self) {
        self.missed = 0;
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .map(|(&id, e)| ClientInfo {
                id,
                peer: e.peer.clone(),
                transport: e.sink.kind(),
                ready: e.is_ready(),
                bytes_sent: e.bytes_sent,
                missed: e.missed,
                connected_secs: e.connected_at.elapsed().as_secs(),
            })
            .collect()
    }

    /// Mirror the current client list into `table`.
    pub fn publish_to(&self, table: &ClientTable) {
        table.retain(|id, _| self.clients.contains_key(id));
        for info in self.clients() {
            table.insert(info.id, info);
        }
    }
}
