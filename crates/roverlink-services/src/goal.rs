//! Navigation goal tracking.
//!
//! The status shown to clients is that of the most recently sent goal:
//! the last status entry whose stamp matches the goal's, or -1.

use bytes::Bytes;
use roverlink_core::telemetry::{GoalId, GoalRequest, GoalStatusEntry, Pose};
use roverlink_core::wire;

/// No goal, or no status entry for it yet.
pub const NO_STATUS: i32 = -1;

/// Statuses up to this value (pending, active) are cancellable.
const LAST_CANCELLABLE: u8 = 1;

#[derive(Debug, Default)]
pub struct GoalTracker {
    current: Option<GoalRequest>,
    statuses: Option<Vec<GoalStatusEntry>>,
}

impl GoalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goal_sent(&mut self, goal: GoalRequest) {
        self.current = Some(goal);
    }

    pub fn update_statuses(&mut self, statuses: Vec<GoalStatusEntry>) {
        self.statuses = Some(statuses);
    }

    pub fn status(&self) -> i32 {
        let (Some(goal), Some(statuses)) = (&self.current, &self.statuses) else {
            return NO_STATUS;
        };
        statuses
            .iter()
            .rev()
            .find(|s| s.goal_id.stamp == goal.stamp)
            .map_or(NO_STATUS, |s| i32::from(s.status))
    }

    pub fn target(&self) -> Pose {
        self.current.as_ref().map(|g| g.target).unwrap_or_default()
    }

    pub fn encode(&self) -> Bytes {
        wire::encode_goal_status(self.status(), &self.target())
    }

    /// Goals that a stop should cancel. None until the first status list.
    pub fn cancellable(&self) -> Option<Vec<GoalId>> {
        let statuses = self.statuses.as_ref()?;
        Some(
            statuses
                .iter()
                .filter(|s| s.status <= LAST_CANCELLABLE)
                .map(|s| s.goal_id.clone())
                .collect(),
        )
    }
}
