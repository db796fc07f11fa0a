//! Single-flight parameter queue.
//!
//! Applying a parameter may restart the node it targets, so at most one
//! apply process runs at a time. Requests arriving meanwhile wait in FIFO
//! order. The queue only tracks state; the pump timer in the gateway asks
//! it for the next command and launches it.

use std::collections::VecDeque;

use roverlink_core::params::ParamCommand;

use crate::collaborator::{JobId, ProcessOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum QueueState {
    Idle,
    Running { job: JobId, command: ParamCommand },
}

#[derive(Debug)]
pub struct ParamQueue {
    pending: VecDeque<ParamCommand>,
    state: QueueState,
}

impl Default for ParamQueue {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            state: QueueState::Idle,
        }
    }
}

impl ParamQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, commands: impl IntoIterator<Item = ParamCommand>) {
        self.pending.extend(commands);
    }

    pub fn depth(&self) -> usize {
        self.pending.len()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, QueueState::Running { .. })
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    /// Idle with work pending: dequeue the oldest command and mark it
    /// running under `job`. Otherwise None.
    pub fn start_next(&mut self, job: JobId) -> Option<ParamCommand> {
        if self.is_running() {
            return None;
        }
        let command = self.pending.pop_front()?;
        self.state = QueueState::Running {
            job,
            command: command.clone(),
        };
        Some(command)
    }

    /// The running job ended. Returns its status line, or None if `job` is
    /// not the one in flight.
    pub fn finish(&mut self, job: JobId, outcome: &ProcessOutcome) -> Option<String> {
        match &self.state {
            QueueState::Running { job: running, .. } if *running == job => {}
            _ => return None,
        }
        match std::mem::replace(&mut self.state, QueueState::Idle) {
            QueueState::Running { command, .. } => {
                Some(format!("{} {}", command.describe(), outcome.describe()))
            }
            QueueState::Idle => None,
        }
    }
}
