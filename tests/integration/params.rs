//! Parameter apply queue and parameter dumps, driven through the launcher.

use std::time::Duration;

use roverlink_core::telemetry::GridStream;
use roverlink_core::wire::{Command, PacketKind};
use roverlink_services::{GatewayEvent, JobKind, ProcessOutcome, TransportKind};

use super::*;

fn exit(gw: &mut TestGateway, job: u64, outcome: ProcessOutcome, stdout: &str) {
    gw.handle(GatewayEvent::ProcessExited {
        job,
        outcome,
        stdout: stdout.to_string(),
    });
}

#[test]
fn nested_changes_apply_one_at_a_time_in_order() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    send(
        &mut gw,
        1,
        Command::SetParams(
            r#"{"move_base": {"TrajectoryPlannerROS": {"max_vel_x": 0.5}, "controller_frequency": 10}}"#
                .into(),
        ),
    );
    assert_eq!(gw.param_queue().depth(), 2);

    gw.on_param_pump();
    let first = gw.launcher().jobs[0].clone();
    assert_eq!(first.program, "rosrun");
    assert_eq!(
        first.args,
        [
            "dynamic_reconfigure",
            "dynparam",
            "set",
            "move_base",
            "TrajectoryPlannerROS/max_vel_x",
            "0.5"
        ]
    );
    assert!(first.forward_output);
    assert_eq!(first.timeout, Duration::from_secs(20));

    // Still running: the pump waits.
    gw.on_param_pump();
    assert_eq!(gw.launcher().jobs.len(), 1);
    assert!(gw.status().param_running);

    exit(&mut gw, first.id, ProcessOutcome::Timeout, "");
    assert_eq!(
        peer.last_text(),
        (
            PacketKind::SetParamsResponse,
            "Setting node move_base parameter TrajectoryPlannerROS/max_vel_x to 0.5 failed - timeout"
                .to_string()
        )
    );

    gw.on_param_pump();
    let second = gw.launcher().jobs[1].clone();
    assert_eq!(second.args[4..], ["controller_frequency", "10"]);
    exit(&mut gw, second.id, ProcessOutcome::Failed(1), "");
    assert!(peer.last_text().1.ends_with("failed with code 1"));
    assert_eq!(gw.param_queue().depth(), 0);
    assert!(!gw.param_queue().is_running());
}

#[test]
fn process_output_is_relayed_while_running() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    send(&mut gw, 1, Command::SetParams(r#"{"amcl": {"use_map_topic": true}}"#.into()));
    gw.on_param_pump();
    let job = gw.launcher().jobs[0].id;

    peer.set_ready(false);
    gw.handle(GatewayEvent::ProcessOutput {
        job,
        text: "couldn't set parameters at node [/amcl]".into(),
    });
    assert_eq!(
        peer.last_text(),
        (
            PacketKind::SetParamsResponse,
            "couldn't set parameters at node [/amcl]".to_string()
        )
    );
}

#[test]
fn relayed_output_waits_for_a_busy_stream_client() {
    let mut gw = gateway();
    let peer = connect_as(&mut gw, 1, TransportKind::Stream);
    full_grid(&mut gw, GridStream::Map, grid_with(&[(0, 1)]));
    assert_eq!(peer.writes(), 1);

    send(&mut gw, 1, Command::SetParams(r#"{"amcl": {"use_map_topic": true}}"#.into()));
    gw.on_param_pump();
    let job = gw.launcher().jobs[0].id;
    for line in ["first", "second", "third"] {
        gw.handle(GatewayEvent::ProcessOutput {
            job,
            text: line.into(),
        });
    }
    assert_eq!(peer.writes(), 1, "one write in flight at a time");
    assert_eq!(gw.status().missed_packets, 3);

    let bytes = peer.packets()[0].len();
    gw.handle(GatewayEvent::WriteComplete { id: 1, bytes });
    gw.handle(GatewayEvent::ProcessOutput {
        job,
        text: "fourth".into(),
    });
    assert_eq!(peer.writes(), 2);
    assert_eq!(peer.last_text().1, "fourth");
}

#[test]
fn plain_text_is_echoed_as_diagnostic() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    send(&mut gw, 1, Command::SetParams("hello from the operator".into()));
    assert_eq!(peer.last_text().1, "hello from the operator");
    assert_eq!(gw.param_queue().depth(), 0);
}

#[test]
fn dump_with_no_nodes_sends_nothing() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    send(&mut gw, 1, Command::GetParams);
    let list = gw.launcher().jobs[0].clone();
    assert_eq!(list.kind, JobKind::ParamList);
    assert_eq!(list.timeout, Duration::from_secs(3));

    exit(&mut gw, list.id, ProcessOutcome::Success, "\n");
    assert_eq!(gw.launcher().jobs.len(), 1);
    assert_eq!(peer.writes(), 0);
}

#[test]
fn dump_tolerates_failed_nodes() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    send(&mut gw, 1, Command::GetParams);
    let list = gw.launcher().jobs[0].id;
    exit(&mut gw, list, ProcessOutcome::Success, "/move_base\n/broken\n");

    let gets = gw.launcher().jobs[1..].to_vec();
    assert_eq!(gets[0].args.last().map(String::as_str), Some("/move_base"));
    exit(&mut gw, gets[1].id, ProcessOutcome::Timeout, "");
    assert_eq!(peer.writes(), 0, "waits for every node");
    exit(
        &mut gw,
        gets[0].id,
        ProcessOutcome::Success,
        "{'planner_frequency': 0.0, 'recovery_behavior_enabled': False, 'groups': {'id': 0}}",
    );

    let (kind, text) = peer.last_text();
    assert_eq!(kind, PacketKind::GetParamsResponse);
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "move_base": {
                "planner_frequency": 0.0,
                "recovery_behavior_enabled": false
            }
        })
    );
}

#[test]
fn a_new_dump_supersedes_the_old_one() {
    let mut gw = gateway();
    let peer = connect(&mut gw, 1);
    send(&mut gw, 1, Command::GetParams);
    let stale = gw.launcher().jobs[0].id;
    send(&mut gw, 1, Command::GetParams);
    let fresh = gw.launcher().jobs[1].id;

    exit(&mut gw, stale, ProcessOutcome::Success, "/amcl\n");
    assert_eq!(gw.launcher().jobs.len(), 2, "stale list is ignored");

    exit(&mut gw, fresh, ProcessOutcome::Success, "/amcl\n");
    let get = gw.launcher().jobs[2].id;
    exit(&mut gw, get, ProcessOutcome::Success, "{'laser_max_beams': 30}");
    let value: serde_json::Value = serde_json::from_str(&peer.last_text().1).unwrap();
    assert_eq!(value["amcl"]["laser_max_beams"], 30);
}

#[test]
fn dumps_and_applies_run_side_by_side() {
    let mut gw = gateway();
    let _peer = connect(&mut gw, 1);
    send(&mut gw, 1, Command::SetParams(r#"{"amcl": {"min_particles": 100}}"#.into()));
    gw.on_param_pump();
    send(&mut gw, 1, Command::GetParams);

    let kinds: Vec<_> = gw.launcher().jobs.iter().map(|j| j.kind.clone()).collect();
    assert!(matches!(kinds[0], JobKind::ParamSet(_)));
    assert_eq!(kinds[1], JobKind::ParamList);
    assert!(gw.param_queue().is_running());
}
