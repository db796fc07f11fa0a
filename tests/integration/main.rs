//! Roverlink integration test harness.
//!
//! Drives a real `Gateway` end to end through recording doubles for the
//! robot bus, the process launcher and client connections. Everything is
//! synchronous: each `handle` call is applied before it returns.
//!
//!   cargo test --test integration

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use roverlink_core::config::RoverlinkConfig;
use roverlink_core::telemetry::{GridSnapshot, GridStream, TelemetryMessage};
use roverlink_core::wire::{self, Command, PacketHeader, PacketKind};
use roverlink_services::{
    BusCommand, ClientId, ClientSink, Gateway, GatewayEvent, Outbound, ProcessJob,
    ProcessLauncher, RobotBus, SinkError, TransportKind,
};

mod catch_up;
mod commands;
mod grids;
mod params;

// ── Doubles ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordedBus {
    pub published: Vec<BusCommand>,
    /// `Some(throttle)` per subscribe, `None` per unsubscribe.
    pub image_subscriptions: Vec<Option<Duration>>,
    pub retargets: Vec<(roverlink_core::telemetry::PathStream, String)>,
}

impl RobotBus for RecordedBus {
    fn publish(&mut self, cmd: BusCommand) {
        self.published.push(cmd);
    }

    fn subscribe_images(&mut self, throttle: Duration) {
        self.image_subscriptions.push(Some(throttle));
    }

    fn unsubscribe_images(&mut self) {
        self.image_subscriptions.push(None);
    }

    fn retarget_path(&mut self, stream: roverlink_core::telemetry::PathStream, topic: &str) {
        self.retargets.push((stream, topic.to_string()));
    }
}

#[derive(Default)]
pub struct RecordedLauncher {
    pub jobs: Vec<ProcessJob>,
    pub restarts: usize,
}

impl ProcessLauncher for RecordedLauncher {
    fn launch(&mut self, job: ProcessJob) {
        self.jobs.push(job);
    }

    fn restart_managed(&mut self) -> Vec<String> {
        self.restarts += 1;
        vec!["gmapping".into(), "jackal_navigation".into()]
    }
}

/// What a test sees of one connected client.
#[derive(Clone, Default)]
pub struct Peer {
    pub written: Arc<Mutex<Vec<Outbound>>>,
    /// Message-framed readiness; stream clients ignore it.
    pub ready: Arc<Mutex<bool>>,
    pub closed: Arc<Mutex<bool>>,
}

impl Peer {
    /// Every packet written so far, flattened across `Outbound`s.
    pub fn packets(&self) -> Vec<Bytes> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .flat_map(|o| o.parts().to_vec())
            .collect()
    }

    pub fn kinds(&self) -> Vec<PacketKind> {
        self.packets()
            .iter()
            .map(|p| PacketHeader::parse(p).unwrap())
            .collect()
    }

    pub fn writes(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    pub fn last_text(&self) -> (PacketKind, String) {
        let last = self.packets().pop().expect("no packets");
        wire::decode_text(&last).unwrap()
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }

    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

struct PeerSink {
    kind: TransportKind,
    peer: Peer,
}

impl ClientSink for PeerSink {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn is_ready(&self) -> bool {
        *self.peer.ready.lock().unwrap()
    }

    fn write(&mut self, out: Outbound) -> Result<(), SinkError> {
        if *self.peer.closed.lock().unwrap() {
            return Err(SinkError::Closed);
        }
        self.peer.written.lock().unwrap().push(out);
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

pub type TestGateway = Gateway<RecordedBus, RecordedLauncher>;

pub fn gateway() -> TestGateway {
    Gateway::new(
        &RoverlinkConfig::with_defaults(),
        RecordedBus::default(),
        RecordedLauncher::default(),
    )
}

pub fn connect_as(gw: &mut TestGateway, id: ClientId, kind: TransportKind) -> Peer {
    let peer = Peer::default();
    peer.set_ready(true);
    gw.handle(GatewayEvent::ClientConnected {
        id,
        peer: format!("10.0.0.{id}:4000"),
        sink: Box::new(PeerSink {
            kind,
            peer: peer.clone(),
        }),
    });
    peer
}

pub fn connect(gw: &mut TestGateway, id: ClientId) -> Peer {
    connect_as(gw, id, TransportKind::Message)
}

pub fn send(gw: &mut TestGateway, id: ClientId, cmd: Command) {
    gw.handle(GatewayEvent::Inbound {
        id,
        bytes: wire::encode_command(&cmd),
    });
}

pub fn full_grid(gw: &mut TestGateway, stream: GridStream, grid: GridSnapshot) {
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::Grid { stream, grid }));
}

/// A 4x4 unknown grid with the given cells set.
pub fn grid_with(cells: &[(usize, i8)]) -> GridSnapshot {
    let mut g = GridSnapshot::filled(4, 4, 0.05, -1);
    for &(i, v) in cells {
        g.data[i] = v;
    }
    g
}
