//! The gateway's outside world: the robot bus and the process launcher.
//!
//! Both are called from the dispatch task and must return immediately.
//! Anything slow happens elsewhere and comes back as a `GatewayEvent`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use roverlink_core::params::ParamCommand;
use roverlink_core::telemetry::{GoalId, PathStream, Pose};
use serde::Serialize;

// ── Robot bus ────────────────────────────────────────────────────────────────

/// Something the gateway publishes on the robot bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusCommand {
    /// Already scaled.
    Velocity { linear: f32, angular: f32 },
    Goal { frame_id: String, pose: Pose },
    CancelGoal { goal_id: GoalId },
    ClearCostmaps,
}

pub trait RobotBus: Send {
    fn publish(&mut self, cmd: BusCommand);

    /// (Re)subscribe to the compressed image topic, throttled to one
    /// message per `throttle`.
    fn subscribe_images(&mut self, throttle: Duration);

    fn unsubscribe_images(&mut self);

    /// Point a path stream at a different source topic.
    fn retarget_path(&mut self, stream: PathStream, topic: &str);
}

/// A published command, as kept in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedCommand {
    pub at_ms: u64,
    pub command: BusCommand,
}

/// Ring of the most recent published commands, readable by the API.
#[derive(Debug, Clone)]
pub struct BusOutbox {
    entries: Arc<Mutex<VecDeque<PublishedCommand>>>,
    capacity: usize,
}

impl BusOutbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, command: BusCommand) {
        let at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(PublishedCommand { at_ms, command });
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<PublishedCommand> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }
}

// ── External processes ───────────────────────────────────────────────────────

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    ParamSet(ParamCommand),
    ParamList,
    ParamGet { node: String },
}

/// One external command run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessJob {
    pub id: JobId,
    pub kind: JobKind,
    pub program: String,
    pub args: Vec<String>,
    /// The launcher kills the process once this elapses.
    pub timeout: Duration,
    /// Stream stdout/stderr lines back as `ProcessOutput` while running.
    pub forward_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Success,
    Failed(i32),
    Timeout,
    SpawnFailed(String),
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success)
    }

    /// Suffix for a status line: "succeeded", "failed with code 1", ...
    pub fn describe(&self) -> String {
        match self {
            ProcessOutcome::Success => "succeeded".to_string(),
            ProcessOutcome::Failed(code) => format!("failed with code {code}"),
            ProcessOutcome::Timeout => "failed - timeout".to_string(),
            ProcessOutcome::SpawnFailed(err) => format!("failed to start: {err}"),
        }
    }
}

pub trait ProcessLauncher: Send {
    /// Start `job`. Never blocks; the exit arrives as a `ProcessExited` event.
    fn launch(&mut self, job: ProcessJob);

    /// Restart the long-running managed processes. Returns their names.
    fn restart_managed(&mut self) -> Vec<String>;
}
