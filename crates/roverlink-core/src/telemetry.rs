//! Telemetry value types, as the robot bus hands them over, already decoded.
//!
//! The gateway never sees bus-specific message classes. Whatever adapter
//! sits between the bus and the gateway converts into these plain values.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── Geometry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    /// Identity rotation.
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

// ── Occupancy grids ──────────────────────────────────────────────────────────

/// The logical grid streams. Each one keeps its own diff baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStream {
    Map,
    GlobalCostmap,
    LocalCostmap,
}

impl GridStream {
    /// Catch-up order for newly connected clients.
    pub const ALL: [GridStream; 3] = [
        GridStream::Map,
        GridStream::GlobalCostmap,
        GridStream::LocalCostmap,
    ];
}

/// Grid metadata. Two grids with different width, height or resolution
/// cannot be diffed against each other.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridInfo {
    pub width: u32,
    pub height: u32,
    pub resolution: f32,
    pub origin: Pose,
}

impl GridInfo {
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when a delta against `other` is meaningful.
    pub fn same_shape(&self, other: &GridInfo) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.resolution == other.resolution
    }
}

/// A full occupancy grid. Cells are -1 (unknown) or 0..=100.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub info: GridInfo,
    pub data: Vec<i8>,
}

impl GridSnapshot {
    /// A grid of `width * height` cells, all set to `fill`.
    pub fn filled(width: u32, height: u32, resolution: f32, fill: i8) -> Self {
        let info = GridInfo {
            width,
            height,
            resolution,
            origin: Pose::default(),
        };
        Self {
            data: vec![fill; info.cell_count()],
            info,
        }
    }

    /// Cell array length matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.info.cell_count()
    }
}

/// A rectangular patch of a grid, placed at (x, y) in the full grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridUpdate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<i8>,
}

// ── Scans, paths, transforms ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanFrame {
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub ranges: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStream {
    Local,
    Global,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathFrame {
    pub poses: Vec<Pose>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformEntry {
    pub parent_frame: String,
    pub child_frame: String,
    pub translation: Vec3,
    pub rotation: Quaternion,
}

// ── Goals ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub secs: u32,
    pub nsecs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalId {
    pub stamp: Stamp,
    pub id: String,
}

/// One entry of the navigation stack's goal status array.
/// 0 = pending, 1 = active; anything higher is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatusEntry {
    pub goal_id: GoalId,
    pub status: u8,
}

/// A goal the navigation stack accepted, as observed on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRequest {
    pub stamp: Stamp,
    pub target: Pose,
}

// ── Images ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ImageFormat {
    Jpeg = 0,
    Png = 1,
}

impl ImageFormat {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Jpeg),
            1 => Some(Self::Png),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedImage {
    pub format: ImageFormat,
    pub data: Bytes,
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Everything the bus adapter can deliver to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryMessage {
    Grid {
        stream: GridStream,
        grid: GridSnapshot,
    },
    GridUpdate {
        stream: GridStream,
        update: GridUpdate,
    },
    Scan {
        scan: ScanFrame,
    },
    Transforms {
        is_static: bool,
        transforms: Vec<TransformEntry>,
    },
    Path {
        stream: PathStream,
        path: PathFrame,
    },
    GoalStatus {
        statuses: Vec<GoalStatusEntry>,
    },
    GoalSent {
        goal: GoalRequest,
    },
    Image {
        image: CompressedImage,
    },
}
