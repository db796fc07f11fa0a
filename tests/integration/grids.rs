//! Grid delta streaming under varying client readiness.

use roverlink_core::telemetry::{GridSnapshot, GridStream, GridUpdate, ScanFrame, TelemetryMessage};
use roverlink_core::wire::{decode_grid, GridChange, PacketKind};
use roverlink_services::{GatewayEvent, TransportKind};

use super::*;

#[test]
fn successive_grids_stream_as_deltas() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);

    full_grid(&mut gw, GridStream::GlobalCostmap, grid_with(&[(0, 10)]));
    full_grid(&mut gw, GridStream::GlobalCostmap, grid_with(&[(0, 10), (9, 99)]));
    full_grid(&mut gw, GridStream::GlobalCostmap, grid_with(&[(0, 20), (9, 99)]));

    let packets: Vec<_> = peer
        .packets()
        .iter()
        .map(|p| decode_grid(p).unwrap())
        .collect();
    assert_eq!(packets.len(), 3);
    assert!(packets.iter().all(|p| p.kind == PacketKind::GlobalCostmap));
    assert!(packets[0].reset);
    assert_eq!(packets[0].changes, vec![GridChange { index: 0, value: 10 }]);
    assert!(!packets[1].reset);
    assert_eq!(packets[1].changes, vec![GridChange { index: 9, value: 99 }]);
    assert_eq!(packets[2].changes, vec![GridChange { index: 0, value: 20 }]);
}

#[test]
fn streams_keep_separate_baselines() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);

    full_grid(&mut gw, GridStream::Map, grid_with(&[(1, 1)]));
    full_grid(&mut gw, GridStream::LocalCostmap, grid_with(&[(1, 1)]));

    let packets: Vec<_> = peer
        .packets()
        .iter()
        .map(|p| decode_grid(p).unwrap())
        .collect();
    assert_eq!(packets[0].kind, PacketKind::Map);
    assert_eq!(packets[1].kind, PacketKind::LocalCostmap);
    // A fresh stream starts from nothing even when another stream matches.
    assert!(packets[1].reset);
}

#[test]
fn resized_grid_resets_the_stream() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);

    full_grid(&mut gw, GridStream::Map, grid_with(&[(3, 50)]));
    let mut bigger = GridSnapshot::filled(8, 8, 0.05, -1);
    bigger.data[3] = 50;
    full_grid(&mut gw, GridStream::Map, bigger);

    let last = decode_grid(peer.packets().last().unwrap()).unwrap();
    assert!(last.reset);
    assert_eq!(last.info.width, 8);
    assert_eq!(last.changes, vec![GridChange { index: 3, value: 50 }]);
}

#[test]
fn stream_client_is_busy_until_its_write_completes() {
    let mut gw = gateway();
    let peer = connect_as(&mut gw, 1, TransportKind::Stream);

    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 1)]));
    assert_eq!(peer.writes(), 1);

    // Second write would overlap the first: nothing goes out.
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 2)]));
    assert_eq!(peer.writes(), 1);
    assert!(!gw.registry().is_ready(1));

    let bytes = peer.packets()[0].len();
    gw.handle(GatewayEvent::WriteComplete { id: 1, bytes });
    assert!(gw.registry().is_ready(1));

    // The diff is against what was sent, so it covers both changes.
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 3)]));
    assert_eq!(peer.writes(), 2);
    let delta = decode_grid(&peer.packets()[1]).unwrap();
    assert!(!delta.reset);
    assert_eq!(delta.changes, vec![GridChange { index: 0, value: 3 }]);
}

#[test]
fn lagging_client_blocks_grids_for_everyone() {
    let mut gw = gateway();
    let fast = connect(&mut gw, 1);
    let slow = connect(&mut gw, 2);

    full_grid(&mut gw, GridStream::Map, grid_with(&[]));
    assert_eq!(fast.writes(), 1);

    slow.set_ready(false);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(5, 5)]));
    assert_eq!(fast.writes(), 1);

    slow.set_ready(true);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(5, 5), (6, 6)]));
    let delta = decode_grid(&fast.packets()[1]).unwrap();
    assert_eq!(
        delta.changes,
        vec![
            GridChange { index: 5, value: 5 },
            GridChange { index: 6, value: 6 }
        ]
    );
    assert_eq!(slow.writes(), 2);
}

#[test]
fn partial_updates_patch_the_received_grid() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);

    // No baseline yet: dropped.
    let patch = GridUpdate {
        x: 1,
        y: 1,
        width: 2,
        height: 1,
        data: vec![40, 41],
    };
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::GridUpdate {
        stream: GridStream::GlobalCostmap,
        update: patch.clone(),
    }));
    assert_eq!(peer.writes(), 0);

    full_grid(&mut gw, GridStream::GlobalCostmap, grid_with(&[]));
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::GridUpdate {
        stream: GridStream::GlobalCostmap,
        update: patch,
    }));

    let update = decode_grid(peer.packets().last().unwrap()).unwrap();
    assert!(!update.reset);
    // Row 1 of a 4-wide grid starts at index 4.
    assert_eq!(
        update.changes,
        vec![
            GridChange { index: 5, value: 40 },
            GridChange { index: 6, value: 41 }
        ]
    );

    // A later full grid equal to the patched one produces no changes.
    full_grid(
        &mut gw,
        GridStream::GlobalCostmap,
        grid_with(&[(5, 40), (6, 41)]),
    );
    let last = decode_grid(peer.packets().last().unwrap()).unwrap();
    assert!(last.changes.is_empty());
}

#[test]
fn skipped_packets_are_counted_as_missed() {
    let mut gw = gateway();
    let _ready = connect(&mut gw, 1);
    let busy = connect(&mut gw, 2);
    busy.set_ready(false);

    for _ in 0..3 {
        gw.handle(GatewayEvent::Telemetry(TelemetryMessage::Scan {
            scan: ScanFrame::default(),
        }));
    }
    assert_eq!(gw.status().missed_packets, 3);
    assert_eq!(busy.writes(), 0);
}
