//! What a newly connected client receives before live traffic.

use roverlink_core::telemetry::{
    GridStream, Quaternion, TelemetryMessage, TransformEntry, Vec3,
};
use roverlink_core::wire::{
    decode_grid, transform_packet_size, GridChange, PacketHeader, PacketKind, UNKNOWN_CELL,
};
use roverlink_services::{GatewayEvent, TransportKind};

use super::*;

fn transform(parent: &str, child: &str, x: f64) -> TransformEntry {
    TransformEntry {
        parent_frame: parent.into(),
        child_frame: child.into(),
        translation: Vec3 { x, y: 0.0, z: 0.0 },
        rotation: Quaternion::default(),
    }
}

fn transforms(gw: &mut TestGateway, is_static: bool, entries: Vec<TransformEntry>) {
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::Transforms {
        is_static,
        transforms: entries,
    }));
}

#[test]
fn catch_up_is_one_write_in_stream_order() {
    let mut gw = gateway();
    full_grid(&mut gw, GridStream::LocalCostmap, grid_with(&[(2, 2)]));
    full_grid(&mut gw, GridStream::Map, grid_with(&[(1, 1)]));
    full_grid(&mut gw, GridStream::GlobalCostmap, grid_with(&[(3, 3)]));
    transforms(
        &mut gw,
        true,
        vec![
            transform("base_link", "front_laser", 0.2),
            transform("base_link", "camera", 0.1),
        ],
    );

    let peer = connect(&mut gw, 9);
    assert_eq!(peer.writes(), 1);
    assert_eq!(
        peer.kinds(),
        vec![
            PacketKind::Map,
            PacketKind::GlobalCostmap,
            PacketKind::LocalCostmap,
            PacketKind::Transform,
        ]
    );

    let packets = peer.packets();
    assert_eq!(packets[3].len(), 2 * transform_packet_size());
    let map = decode_grid(&packets[0]).unwrap();
    assert!(map.reset);
    assert_eq!(map.changes, vec![GridChange { index: 1, value: 1 }]);
}

#[test]
fn catch_up_ignores_lagging_clients() {
    let mut gw = gateway();
    let slow = connect(&mut gw, 1);
    slow.set_ready(false);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(4, 44)]));
    assert_eq!(slow.writes(), 0);

    // Nothing has gone out on this stream yet, so the newcomer starts from
    // the freshest grid; the next broadcast resets everyone.
    let peer = connect(&mut gw, 2);
    let map = decode_grid(&peer.packets()[0]).unwrap();
    assert_eq!(map.changes, vec![GridChange { index: 4, value: 44 }]);

    slow.set_ready(true);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(4, 44)]));
    assert!(decode_grid(peer.packets().last().unwrap()).unwrap().reset);
}

/// Rebuild the grid a client holds from every grid packet it received.
fn replay(peer: &Peer, kind: PacketKind) -> Vec<i8> {
    let mut cells = Vec::new();
    for packet in peer.packets() {
        if PacketHeader::parse(&packet) != Ok(kind) {
            continue;
        }
        let grid = decode_grid(&packet).unwrap();
        if grid.reset {
            cells = vec![UNKNOWN_CELL; (grid.info.width * grid.info.height) as usize];
        }
        for change in grid.changes {
            cells[change.index as usize] = change.value;
        }
    }
    cells
}

#[test]
fn newcomer_during_backpressure_stays_in_sync() {
    let mut gw = gateway();
    let a = connect(&mut gw, 1);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 0)]));

    a.set_ready(false);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 50)]));
    assert_eq!(a.writes(), 1, "held back");

    let b = connect(&mut gw, 2);
    a.set_ready(true);
    let truth = grid_with(&[(0, 0)]);
    full_grid(&mut gw, GridStream::Map, truth.clone());

    assert_eq!(replay(&a, PacketKind::Map), truth.data);
    assert_eq!(replay(&b, PacketKind::Map), truth.data);
}

#[test]
fn nothing_to_catch_up_means_no_write() {
    let mut gw = gateway();
    let peer = connect_as(&mut gw, 1, TransportKind::Stream);
    assert_eq!(peer.writes(), 0);
    assert!(gw.registry().is_ready(1));
}

#[test]
fn static_transforms_replace_by_child_frame() {
    let mut gw = gateway();
    transforms(&mut gw, true, vec![transform("base_link", "front_laser", 0.2)]);
    transforms(&mut gw, true, vec![transform("base_link", "front_laser", 0.3)]);

    let peer = connect(&mut gw, 1);
    assert_eq!(peer.packets()[0].len(), transform_packet_size());
    assert_eq!(gw.status().static_transforms, 1);
}

#[test]
fn dynamic_transforms_go_out_on_the_tick() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    transforms(
        &mut gw,
        false,
        vec![transform("odom", "base_link", 1.0), transform("map", "odom", 0.0)],
    );
    // Dynamic transforms are not pushed on arrival.
    assert_eq!(peer.writes(), 0);

    gw.on_transform_tick();
    assert_eq!(peer.writes(), 1);
    assert_eq!(peer.packets()[0].len(), 2 * transform_packet_size());

    peer.set_ready(false);
    gw.on_transform_tick();
    assert_eq!(peer.writes(), 1);
}

#[test]
fn reconnecting_after_a_failed_write_resynchronizes() {
    let mut gw = gateway();
    let first = connect(&mut gw, 1);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 1)]));

    first.close();
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 2)]));
    assert!(!gw.registry().contains(1));
    // The transport's own disconnect report arrives afterwards and is harmless.
    gw.handle(GatewayEvent::ClientDisconnected { id: 1 });

    let second = connect(&mut gw, 2);
    let map = decode_grid(&second.packets()[0]).unwrap();
    assert!(map.reset);
    assert_eq!(map.changes, vec![GridChange { index: 0, value: 2 }]);
}
