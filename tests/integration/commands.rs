//! Client commands and what they cause on the bus.

use std::time::Duration;

use bytes::Bytes;
use roverlink_core::telemetry::{
    CompressedImage, GoalId, GoalRequest, GoalStatusEntry, GridStream, ImageFormat, PathStream,
    Pose, Stamp, TelemetryMessage,
};
use roverlink_core::wire::{decode_grid, Command, PacketKind};
use roverlink_services::{BusCommand, GatewayEvent};

use super::*;

fn status(secs: u32, id: &str, status: u8) -> GoalStatusEntry {
    GoalStatusEntry {
        goal_id: GoalId {
            stamp: Stamp { secs, nsecs: 0 },
            id: id.into(),
        },
        status,
    }
}

fn image(gw: &mut TestGateway) {
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::Image {
        image: CompressedImage {
            format: ImageFormat::Jpeg,
            data: Bytes::from_static(b"\xff\xd8frame"),
        },
    }));
}

#[test]
fn goal_status_is_broadcast_for_the_current_goal() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);

    send(&mut gw, 1, Command::Goal(Pose::default()));
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::GoalSent {
        goal: GoalRequest {
            stamp: Stamp { secs: 7, nsecs: 0 },
            target: Pose::default(),
        },
    }));
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::GoalStatus {
        statuses: vec![status(3, "old", 3), status(7, "current", 1)],
    }));

    assert_eq!(peer.kinds(), vec![PacketKind::GoalStatus]);
    assert_eq!(
        gw.bus().published,
        vec![BusCommand::Goal {
            frame_id: "map".into(),
            pose: Pose::default()
        }]
    );
}

#[test]
fn stop_cancels_only_open_goals() {
    let mut gw = gateway();
    gw.handle(GatewayEvent::Telemetry(TelemetryMessage::GoalStatus {
        statuses: vec![status(1, "pending", 0), status(2, "active", 1), status(3, "done", 3)],
    }));
    send(&mut gw, 1, Command::Stop);

    let cancelled: Vec<String> = gw
        .bus()
        .published
        .iter()
        .filter_map(|c| match c {
            BusCommand::CancelGoal { goal_id } => Some(goal_id.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(cancelled, vec!["pending", "active"]);
}

#[test]
fn malformed_packets_are_ignored() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    gw.handle(GatewayEvent::Inbound {
        id: 1,
        bytes: Bytes::from_static(b"not a packet"),
    });
    gw.handle(GatewayEvent::Inbound {
        id: 1,
        bytes: Bytes::new(),
    });
    assert!(gw.bus().published.is_empty());
    assert_eq!(peer.writes(), 0);
    assert!(gw.registry().contains(1));
}

#[test]
fn clear_maps_resets_every_stream_and_reports() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 1)]));

    peer.set_ready(false);
    send(&mut gw, 1, Command::ClearMaps);
    // Text responses ignore readiness.
    assert_eq!(
        peer.last_text(),
        (
            PacketKind::SetParamsResponse,
            "Restarted gmapping and jackal_navigation".to_string()
        )
    );
    assert_eq!(gw.launcher().restarts, 1);
    assert_eq!(gw.bus().published, vec![BusCommand::ClearCostmaps]);

    peer.set_ready(true);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 1)]));
    let after = decode_grid(peer.packets().last().unwrap()).unwrap();
    assert!(after.reset);
}

#[test]
fn image_throttle_tracks_subscribers_and_connections() {
    let mut gw = gateway();
    let _a = connect(&mut gw, 1);
    send(&mut gw, 1, Command::EnableImage);
    // 100 ms per subscriber + 50 ms per connection - 100 ms.
    assert_eq!(
        gw.bus().image_subscriptions,
        vec![Some(Duration::from_millis(50))]
    );

    let _b = connect(&mut gw, 2);
    assert_eq!(
        gw.bus().image_subscriptions[1..],
        [None, Some(Duration::from_millis(100))]
    );

    // Enabling twice changes nothing.
    send(&mut gw, 1, Command::EnableImage);
    assert_eq!(gw.bus().image_subscriptions.len(), 3);

    send(&mut gw, 1, Command::DisableImage);
    assert_eq!(gw.bus().image_subscriptions.last(), Some(&None));
    assert_eq!(gw.status().image_throttle_ms, None);
}

#[test]
fn images_reach_subscribers_only_and_dead_ones_are_dropped() {
    let mut gw = gateway();
    let watcher = connect(&mut gw, 1);
    let other = connect(&mut gw, 2);
    let doomed = connect(&mut gw, 3);
    send(&mut gw, 1, Command::EnableImage);
    send(&mut gw, 3, Command::EnableImage);

    doomed.close();
    image(&mut gw);

    let packets = watcher.packets();
    assert_eq!(packets.len(), 2, "header then payload");
    assert_eq!(
        PacketHeader::parse(&packets[0]).unwrap(),
        PacketKind::CompressedImage
    );
    assert_eq!(packets[1].as_ref(), b"\xff\xd8frame");
    assert_eq!(other.writes(), 0);
    assert!(!gw.registry().contains(3));
    assert_eq!(gw.images().subscribers(), &[1]);
}

#[test]
fn path_retarget_reaches_the_bus() {
    let mut gw = gateway();
    gw.handle(GatewayEvent::RetargetPath {
        stream: PathStream::Global,
        topic: "/move_base/TrajectoryPlannerROS/global_plan".into(),
    });
    assert_eq!(
        gw.bus().retargets,
        vec![(
            PathStream::Global,
            "/move_base/TrajectoryPlannerROS/global_plan".to_string()
        )]
    );
}
