//! Sparse occupancy-grid diffs.

use roverlink_core::telemetry::{GridSnapshot, GridUpdate};
use roverlink_core::wire::{GridChange, UNKNOWN_CELL};

fn change(index: usize, value: i8) -> GridChange {
    // Out-of-range indices saturate and are rejected later by `pack`.
    GridChange {
        index: u32::try_from(index).unwrap_or(u32::MAX),
        value,
    }
}

/// Cells of `current` that differ from `previous`.
///
/// A cell past the end of `previous` is only a change when it is known;
/// an empty `previous` therefore yields every known cell, which is how a
/// full resend is produced.
pub fn compute_delta(current: &[i8], previous: &[i8]) -> Vec<GridChange> {
    current
        .iter()
        .enumerate()
        .filter(|&(i, &value)| match previous.get(i) {
            Some(&old) => old != value,
            None => value != UNKNOWN_CELL,
        })
        .map(|(i, &value)| change(i, value))
        .collect()
}

/// Write `changes` into `cells`. Indices outside `cells` are ignored.
pub fn apply_delta(cells: &mut [i8], changes: &[GridChange]) {
    for c in changes {
        if let Some(cell) = cells.get_mut(c.index as usize) {
            *cell = c.value;
        }
    }
}

/// Apply a rectangular patch to `baseline` in place, returning the cells
/// that actually changed. Patch cells falling outside the baseline are
/// dropped.
pub fn apply_partial_update(update: &GridUpdate, baseline: &mut GridSnapshot) -> Vec<GridChange> {
    let grid_w = baseline.info.width as usize;
    let grid_h = baseline.info.height as usize;
    let (ux, uy) = (update.x as usize, update.y as usize);
    let (uw, uh) = (update.width as usize, update.height as usize);

    let mut changes = Vec::new();
    for y in 0..uh {
        for x in 0..uw {
            let Some(&value) = update.data.get(y * uw + x) else {
                continue;
            };
            let (gx, gy) = (ux + x, uy + y);
            if gx >= grid_w || gy >= grid_h {
                continue;
            }
            let index = gy * grid_w + gx;
            match baseline.data.get_mut(index) {
                Some(cell) if *cell != value => {
                    *cell = value;
                    changes.push(change(index, value));
                }
                _ => {}
            }
        }
    }
    changes
}
