//! Per-stream grid baselines.
//!
//! Each stream keeps two snapshots:
//!   received: the freshest full grid, patched in place by partial updates
//!   sent:     what was last broadcast to the client population
//!
//! They diverge when backpressure holds a broadcast back. `sent` is tracked
//! per stream, not per client: a client that missed one broadcast is only
//! resynchronized by the next reset or by reconnecting. A new client is
//! resynchronized to `sent`, since every later delta is taken against it.

use std::collections::BTreeMap;

use bytes::Bytes;
use roverlink_core::telemetry::{GridInfo, GridSnapshot, GridStream, GridUpdate};
use roverlink_core::wire::{self, GridChange, WireError};

use crate::delta::{apply_delta, apply_partial_update, compute_delta};

#[derive(Debug, Default, Clone)]
pub struct StreamBaselines {
    pub sent: Option<GridSnapshot>,
    pub received: Option<GridSnapshot>,
}

/// One grid packet ready to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFrame {
    pub stream: GridStream,
    pub info: GridInfo,
    pub reset: bool,
    pub changes: Vec<GridChange>,
}

impl GridFrame {
    pub fn encode(&self) -> Result<Bytes, WireError> {
        wire::encode_grid(self.stream.packet_kind(), &self.info, self.reset, &self.changes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("no full {0:?} grid received yet")]
    NoBaseline(GridStream),
}

#[derive(Debug, Default)]
pub struct GridStreamStore {
    streams: BTreeMap<GridStream, StreamBaselines>,
}

impl GridStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baselines(&self, stream: GridStream) -> Option<&StreamBaselines> {
        self.streams.get(&stream)
    }

    /// Replace the received baseline. A grid whose cell count does not
    /// match its dimensions is rejected and leaves both baselines untouched.
    pub fn record_received(&mut self, stream: GridStream, grid: GridSnapshot) -> bool {
        if !grid.is_consistent() {
            tracing::warn!(
                ?stream,
                width = grid.info.width,
                height = grid.info.height,
                cells = grid.data.len(),
                "grid cell count does not match its dimensions, dropped"
            );
            return false;
        }
        self.streams.entry(stream).or_default().received = Some(grid);
        true
    }

    /// Diff the received baseline against the sent one. A missing sent
    /// baseline or a shape change diffs against nothing and sets reset.
    pub fn pending_frame(&self, stream: GridStream) -> Option<GridFrame> {
        let baselines = self.streams.get(&stream)?;
        let current = baselines.received.as_ref()?;
        let (reset, previous): (bool, &[i8]) = match &baselines.sent {
            Some(sent) if sent.info.same_shape(&current.info) => (false, sent.data.as_slice()),
            _ => (true, &[][..]),
        };
        Some(GridFrame {
            stream,
            info: current.info,
            reset,
            changes: compute_delta(&current.data, previous),
        })
    }

    /// The received baseline has reached the clients.
    pub fn mark_sent(&mut self, stream: GridStream) {
        if let Some(b) = self.streams.get_mut(&stream) {
            b.sent = b.received.clone();
        }
    }

    /// Patch the received baseline. The returned frame carries only the
    /// cells that changed and never sets reset.
    pub fn apply_update(
        &mut self,
        stream: GridStream,
        update: &GridUpdate,
    ) -> Result<GridFrame, GridError> {
        let received = self
            .streams
            .get_mut(&stream)
            .and_then(|b| b.received.as_mut())
            .ok_or(GridError::NoBaseline(stream))?;
        let changes = apply_partial_update(update, received);
        Ok(GridFrame {
            stream,
            info: received.info,
            reset: false,
            changes,
        })
    }

    /// Mirror a broadcast update into the sent baseline.
    pub fn mark_update_sent(&mut self, frame: &GridFrame) {
        if let Some(sent) = self
            .streams
            .get_mut(&frame.stream)
            .and_then(|b| b.sent.as_mut())
        {
            apply_delta(&mut sent.data, &frame.changes);
        }
    }

    /// Full resync frames for a new client, in catch-up order.
    ///
    /// Built from `sent` so the client holds exactly what the next delta
    /// is diffed against. With nothing sent yet, `received` is used; the
    /// next broadcast on that stream resets anyway.
    pub fn catch_up(&self) -> Vec<GridFrame> {
        GridStream::ALL
            .iter()
            .filter_map(|&stream| {
                let baselines = self.streams.get(&stream)?;
                let grid = baselines.sent.as_ref().or(baselines.received.as_ref())?;
                Some(GridFrame {
                    stream,
                    info: grid.info,
                    reset: true,
                    changes: compute_delta(&grid.data, &[]),
                })
            })
            .collect()
    }

    /// Forget every baseline. The next full grid on each stream resets.
    pub fn clear(&mut self) {
        self.streams.clear();
    }
}
