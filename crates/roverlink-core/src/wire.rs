//! roverlink wire format: fixed-layout little-endian packets.
//!
//! Every packet starts with a 32-byte ASCII tag, null padded, naming its
//! kind. There is no length prefix, no version byte and no negotiation:
//! the tag fully determines the layout that follows. Clients in the field
//! decode these bytes by hand, so every size below is part of the protocol.
//!
//! Fixed parts are `#[repr(C)]` structs built from zerocopy's byte-order
//! types. They have alignment 1, no padding, and serialize with a plain
//! `as_bytes()`. Packet sizes are always computed up front and the buffer
//! is allocated once.

use std::mem::size_of;

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{F32, F64, I32, LE, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::telemetry::{
    GridInfo, GridStream, ImageFormat, PathFrame, PathStream, Pose, Quaternion, ScanFrame,
    TransformEntry, Vec3,
};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Length of the packet tag that opens every packet.
pub const PACKET_ID_LEN: usize = 32;

/// Frame names inside transform packets are truncated/padded to this length.
pub const FRAME_NAME_LEN: usize = 32;

/// Largest cell index that fits in the upper 24 bits of a packed change.
pub const MAX_CHANGE_INDEX: u32 = (1 << 24) - 1;

/// Cell value meaning "unknown".
pub const UNKNOWN_CELL: i8 = -1;

// ── Packet kinds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Map,
    GlobalCostmap,
    LocalCostmap,
    Scan,
    Transform,
    LocalPath,
    GlobalPath,
    GoalStatus,
    VelocityCommand,
    GoalCommand,
    StopCommand,
    ClearMapsCommand,
    SetParamsCommand,
    SetParamsResponse,
    GetParamsCommand,
    GetParamsResponse,
    CompressedImage,
    EnableImage,
    DisableImage,
    MiscStats,
}

impl PacketKind {
    pub const ALL: [PacketKind; 20] = [
        PacketKind::Map,
        PacketKind::GlobalCostmap,
        PacketKind::LocalCostmap,
        PacketKind::Scan,
        PacketKind::Transform,
        PacketKind::LocalPath,
        PacketKind::GlobalPath,
        PacketKind::GoalStatus,
        PacketKind::VelocityCommand,
        PacketKind::GoalCommand,
        PacketKind::StopCommand,
        PacketKind::ClearMapsCommand,
        PacketKind::SetParamsCommand,
        PacketKind::SetParamsResponse,
        PacketKind::GetParamsCommand,
        PacketKind::GetParamsResponse,
        PacketKind::CompressedImage,
        PacketKind::EnableImage,
        PacketKind::DisableImage,
        PacketKind::MiscStats,
    ];

    /// The ASCII tag written into the packet header.
    /// These strings are the protocol and must never change.
    pub fn tag(self) -> &'static str {
        match self {
            PacketKind::Map => "MAP_PCKT_ID",
            PacketKind::GlobalCostmap => "GLOB_CM_PCKT_ID",
            PacketKind::LocalCostmap => "LOC_CM_PCKT_ID",
            PacketKind::Scan => "SCAN_PCKT_ID",
            PacketKind::Transform => "TFORM_PCKT_ID",
            PacketKind::LocalPath => "LOC_NAVP_PCKT_ID",
            PacketKind::GlobalPath => "GLOB_NAVP_PCKT_ID",
            PacketKind::GoalStatus => "GOAL_STAT_PCKT_ID",
            PacketKind::VelocityCommand => "VEL_CMD_PCKT_ID",
            PacketKind::GoalCommand => "GOAL_CMD_PCKT_ID",
            PacketKind::StopCommand => "STOP_CMD_PCKT_ID",
            PacketKind::ClearMapsCommand => "CLEAR_MAPS_PCKT_ID",
            PacketKind::SetParamsCommand => "SET_PARAMS_CMD_PCKT_ID",
            PacketKind::SetParamsResponse => "SET_PARAMS_RESP_CMD_PCKT_ID",
            PacketKind::GetParamsCommand => "GET_PARAMS_CMD_PCKT_ID",
            PacketKind::GetParamsResponse => "GET_PARAMS_RESP_CMD_PCKT_ID",
            PacketKind::CompressedImage => "COMP_IMG_PCKT_ID",
            PacketKind::EnableImage => "ENABLE_IMG_PCKT_ID",
            PacketKind::DisableImage => "DISABLE_IMG_PCKT_ID",
            PacketKind::MiscStats => "MISC_STATS_PCKT_ID",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }
}

impl GridStream {
    pub fn packet_kind(self) -> PacketKind {
        match self {
            GridStream::Map => PacketKind::Map,
            GridStream::GlobalCostmap => PacketKind::GlobalCostmap,
            GridStream::LocalCostmap => PacketKind::LocalCostmap,
        }
    }
}

impl PathStream {
    pub fn packet_kind(self) -> PacketKind {
        match self {
            PathStream::Local => PacketKind::LocalPath,
            PathStream::Global => PacketKind::GlobalPath,
        }
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// The 32-byte tag that opens every packet.
///
/// Wire size: 32 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct PacketHeader {
    pub id: [u8; PACKET_ID_LEN],
}

assert_eq_size!(PacketHeader, [u8; 32]);

impl PacketHeader {
    pub fn new(kind: PacketKind) -> Self {
        Self {
            id: padded_name(kind.tag()),
        }
    }

    /// Identify the packet kind of a buffer. Trailing nulls are stripped
    /// before comparison.
    pub fn parse(buf: &[u8]) -> Result<PacketKind, WireError> {
        let header = PacketHeader::read_from_prefix(buf).ok_or(WireError::Truncated {
            needed: PACKET_ID_LEN,
            got: buf.len(),
        })?;
        let end = header
            .id
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        let tag = std::str::from_utf8(&header.id[..end])
            .map_err(|_| WireError::UnknownKind(String::from_utf8_lossy(&header.id[..end]).into_owned()))?;
        PacketKind::from_tag(tag).ok_or_else(|| WireError::UnknownKind(tag.to_string()))
    }
}

/// Copy `name` into a fixed 32-byte field, truncating or null padding.
fn padded_name(name: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let bytes = name.as_bytes();
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

// ── Fixed layouts ─────────────────────────────────────────────────────────────

/// Position followed by orientation quaternion.
///
/// Wire size: 56 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct PoseWire {
    pub position: [F64<LE>; 3],
    pub orientation: [F64<LE>; 4],
}

assert_eq_size!(PoseWire, [u8; 56]);

impl From<&Pose> for PoseWire {
    fn from(p: &Pose) -> Self {
        Self {
            position: vec3_wire(&p.position),
            orientation: quat_wire(&p.orientation),
        }
    }
}

impl From<&PoseWire> for Pose {
    fn from(w: &PoseWire) -> Self {
        Pose {
            position: Vec3 {
                x: w.position[0].get(),
                y: w.position[1].get(),
                z: w.position[2].get(),
            },
            orientation: Quaternion {
                x: w.orientation[0].get(),
                y: w.orientation[1].get(),
                z: w.orientation[2].get(),
                w: w.orientation[3].get(),
            },
        }
    }
}

fn vec3_wire(v: &Vec3) -> [F64<LE>; 3] {
    [F64::new(v.x), F64::new(v.y), F64::new(v.z)]
}

fn quat_wire(q: &Quaternion) -> [F64<LE>; 4] {
    [F64::new(q.x), F64::new(q.y), F64::new(q.z), F64::new(q.w)]
}

/// Occupancy grid metadata. Followed by `change_count` packed changes.
///
/// Wire size: 73 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct GridHeaderWire {
    pub resolution: F32<LE>,
    pub width: U32<LE>,
    pub height: U32<LE>,
    pub origin: PoseWire,
    /// 1 = clients must discard accumulated state for this stream.
    pub reset: u8,
    pub change_count: U32<LE>,
}

assert_eq_size!(GridHeaderWire, [u8; 73]);

/// Laser scan metadata. Followed by N little-endian f32 ranges.
///
/// Wire size: 20 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ScanHeaderWire {
    pub angle_min: F32<LE>,
    pub angle_max: F32<LE>,
    pub angle_increment: F32<LE>,
    pub range_min: F32<LE>,
    pub range_max: F32<LE>,
}

assert_eq_size!(ScanHeaderWire, [u8; 20]);

/// One transform. In a batch, each entry carries its own packet tag.
///
/// Wire size: 120 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct TransformWire {
    pub frame_id: [u8; FRAME_NAME_LEN],
    pub child_frame_id: [u8; FRAME_NAME_LEN],
    pub translation: [F64<LE>; 3],
    pub rotation: [F64<LE>; 4],
}

assert_eq_size!(TransformWire, [u8; 120]);

/// Goal status. -1 means no tracked goal.
///
/// Wire size: 60 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct GoalStatusWire {
    pub status: I32<LE>,
    pub pose: PoseWire,
}

assert_eq_size!(GoalStatusWire, [u8; 60]);

/// Compressed image header. The payload follows as a separate, untagged packet.
///
/// Wire size: 5 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ImageHeaderWire {
    pub format: u8,
    pub length: U32<LE>,
}

assert_eq_size!(ImageHeaderWire, [u8; 5]);

/// Wire size: 9 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct MiscStatsWire {
    pub connections: u8,
    pub current_mbps: F32<LE>,
    pub average_mbps: F32<LE>,
}

assert_eq_size!(MiscStatsWire, [u8; 9]);

/// Inbound velocity command, unscaled.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct VelocityWire {
    pub linear: F32<LE>,
    pub angular: F32<LE>,
}

assert_eq_size!(VelocityWire, [u8; 8]);

// ── Grid changes ──────────────────────────────────────────────────────────────

/// A single cell that differs from the comparison baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridChange {
    pub index: u32,
    pub value: i8,
}

impl GridChange {
    /// Pack into `index << 8 | value_byte`. Unknown (-1) travels as 255.
    /// Indices above 24 bits are an encoding fault, never wrapped.
    pub fn pack(self) -> Result<u32, WireError> {
        if self.index > MAX_CHANGE_INDEX {
            return Err(WireError::IndexOverflow { index: self.index });
        }
        Ok((self.index << 8) | u32::from(self.value as u8))
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            index: word >> 8,
            value: (word & 0xff) as u8 as i8,
        }
    }
}

// ── Packet sizes ──────────────────────────────────────────────────────────────

pub fn grid_packet_size(change_count: usize) -> usize {
    PACKET_ID_LEN + size_of::<GridHeaderWire>() + change_count * size_of::<u32>()
}

pub fn scan_packet_size(range_count: usize) -> usize {
    PACKET_ID_LEN + size_of::<ScanHeaderWire>() + range_count * size_of::<f32>()
}

pub fn transform_packet_size() -> usize {
    PACKET_ID_LEN + size_of::<TransformWire>()
}

pub fn path_packet_size(pose_count: usize) -> usize {
    PACKET_ID_LEN + size_of::<u32>() + pose_count * size_of::<PoseWire>()
}

pub fn goal_status_packet_size() -> usize {
    PACKET_ID_LEN + size_of::<GoalStatusWire>()
}

pub fn text_packet_size(text: &str) -> usize {
    PACKET_ID_LEN + size_of::<u32>() + text.len()
}

pub fn image_header_packet_size() -> usize {
    PACKET_ID_LEN + size_of::<ImageHeaderWire>()
}

pub fn misc_stats_packet_size() -> usize {
    PACKET_ID_LEN + size_of::<MiscStatsWire>()
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn packet(kind: PacketKind, size: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(size);
    buf.put_slice(PacketHeader::new(kind).as_bytes());
    buf
}

fn finish(buf: BytesMut, size: usize) -> Bytes {
    debug_assert_eq!(buf.len(), size, "packet size precomputation is wrong");
    buf.freeze()
}

/// Encode an occupancy grid packet. Fails without producing any bytes if
/// a change index does not fit the 24-bit budget.
pub fn encode_grid(
    kind: PacketKind,
    info: &GridInfo,
    reset: bool,
    changes: &[GridChange],
) -> Result<Bytes, WireError> {
    let count = u32::try_from(changes.len()).map_err(|_| WireError::TooLarge(changes.len()))?;
    let size = grid_packet_size(changes.len());
    let mut buf = packet(kind, size);
    let header = GridHeaderWire {
        resolution: F32::new(info.resolution),
        width: U32::new(info.width),
        height: U32::new(info.height),
        origin: PoseWire::from(&info.origin),
        reset: u8::from(reset),
        change_count: U32::new(count),
    };
    buf.put_slice(header.as_bytes());
    for change in changes {
        buf.put_u32_le(change.pack()?);
    }
    Ok(finish(buf, size))
}

pub fn encode_scan(scan: &ScanFrame) -> Bytes {
    let size = scan_packet_size(scan.ranges.len());
    let mut buf = packet(PacketKind::Scan, size);
    let header = ScanHeaderWire {
        angle_min: F32::new(scan.angle_min),
        angle_max: F32::new(scan.angle_max),
        angle_increment: F32::new(scan.angle_increment),
        range_min: F32::new(scan.range_min),
        range_max: F32::new(scan.range_max),
    };
    buf.put_slice(header.as_bytes());
    for r in &scan.ranges {
        buf.put_f32_le(*r);
    }
    finish(buf, size)
}

/// Encode a batch of transforms as back-to-back single-transform packets.
pub fn encode_transforms<'a, I>(transforms: I) -> Bytes
where
    I: IntoIterator<Item = &'a TransformEntry>,
    I::IntoIter: ExactSizeIterator,
{
    let iter = transforms.into_iter();
    let size = transform_packet_size() * iter.len();
    let mut buf = BytesMut::with_capacity(size);
    for tf in iter {
        let entry = TransformWire {
            frame_id: padded_name(&tf.parent_frame),
            child_frame_id: padded_name(&tf.child_frame),
            translation: vec3_wire(&tf.translation),
            rotation: quat_wire(&tf.rotation),
        };
        buf.put_slice(PacketHeader::new(PacketKind::Transform).as_bytes());
        buf.put_slice(entry.as_bytes());
    }
    finish(buf, size)
}

pub fn encode_path(stream: PathStream, path: &PathFrame) -> Result<Bytes, WireError> {
    let count = u32::try_from(path.poses.len()).map_err(|_| WireError::TooLarge(path.poses.len()))?;
    let size = path_packet_size(path.poses.len());
    let mut buf = packet(stream.packet_kind(), size);
    buf.put_u32_le(count);
    for pose in &path.poses {
        buf.put_slice(PoseWire::from(pose).as_bytes());
    }
    Ok(finish(buf, size))
}

pub fn encode_goal_status(status: i32, target: &Pose) -> Bytes {
    let size = goal_status_packet_size();
    let mut buf = packet(PacketKind::GoalStatus, size);
    let body = GoalStatusWire {
        status: I32::new(status),
        pose: PoseWire::from(target),
    };
    buf.put_slice(body.as_bytes());
    finish(buf, size)
}

/// Text block: u32 byte length then UTF-8 bytes.
pub fn encode_text(kind: PacketKind, text: &str) -> Result<Bytes, WireError> {
    let len = u32::try_from(text.len()).map_err(|_| WireError::TooLarge(text.len()))?;
    let size = text_packet_size(text);
    let mut buf = packet(kind, size);
    buf.put_u32_le(len);
    buf.put_slice(text.as_bytes());
    Ok(finish(buf, size))
}

/// Header for a compressed image. The payload itself is sent as-is.
pub fn encode_image_header(format: ImageFormat, payload_len: usize) -> Result<Bytes, WireError> {
    let len = u32::try_from(payload_len).map_err(|_| WireError::TooLarge(payload_len))?;
    let size = image_header_packet_size();
    let mut buf = packet(PacketKind::CompressedImage, size);
    let header = ImageHeaderWire {
        format: format.tag(),
        length: U32::new(len),
    };
    buf.put_slice(header.as_bytes());
    Ok(finish(buf, size))
}

pub fn encode_misc_stats(connections: usize, current_mbps: f32, average_mbps: f32) -> Bytes {
    let size = misc_stats_packet_size();
    let mut buf = packet(PacketKind::MiscStats, size);
    let body = MiscStatsWire {
        connections: u8::try_from(connections).unwrap_or(u8::MAX),
        current_mbps: F32::new(current_mbps),
        average_mbps: F32::new(average_mbps),
    };
    buf.put_slice(body.as_bytes());
    finish(buf, size)
}

// ── Inbound commands ──────────────────────────────────────────────────────────

/// A decoded client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Raw joystick values; scaling happens before publishing.
    Velocity { linear: f32, angular: f32 },
    Goal(Pose),
    Stop,
    ClearMaps,
    EnableImage,
    DisableImage,
    GetParams,
    /// Undecoded parameter text. Interpreted by `params::ParamRequest`,
    /// never rejected here.
    SetParams(String),
}

impl Command {
    pub fn kind(&self) -> PacketKind {
        match self {
            Command::Velocity { .. } => PacketKind::VelocityCommand,
            Command::Goal(_) => PacketKind::GoalCommand,
            Command::Stop => PacketKind::StopCommand,
            Command::ClearMaps => PacketKind::ClearMapsCommand,
            Command::EnableImage => PacketKind::EnableImage,
            Command::DisableImage => PacketKind::DisableImage,
            Command::GetParams => PacketKind::GetParamsCommand,
            Command::SetParams(_) => PacketKind::SetParamsCommand,
        }
    }
}

/// Decode one inbound command packet.
pub fn decode_command(buf: &[u8]) -> Result<Command, WireError> {
    let kind = PacketHeader::parse(buf)?;
    let body = &buf[PACKET_ID_LEN..];
    match kind {
        PacketKind::VelocityCommand => {
            let v = read_prefix::<VelocityWire>(body)?;
            Ok(Command::Velocity {
                linear: v.linear.get(),
                angular: v.angular.get(),
            })
        }
        PacketKind::GoalCommand => {
            let p = read_prefix::<PoseWire>(body)?;
            Ok(Command::Goal(Pose::from(&p)))
        }
        PacketKind::StopCommand => Ok(Command::Stop),
        PacketKind::ClearMapsCommand => Ok(Command::ClearMaps),
        PacketKind::EnableImage => Ok(Command::EnableImage),
        PacketKind::DisableImage => Ok(Command::DisableImage),
        PacketKind::GetParamsCommand => Ok(Command::GetParams),
        PacketKind::SetParamsCommand => {
            let text = read_text_body(body)?;
            Ok(Command::SetParams(String::from_utf8_lossy(text).into_owned()))
        }
        other => Err(WireError::UnexpectedKind(other)),
    }
}

/// Encode a command the way a client would. Used by tests and tooling.
pub fn encode_command(cmd: &Command) -> Bytes {
    let kind = cmd.kind();
    match cmd {
        Command::Velocity { linear, angular } => {
            let size = PACKET_ID_LEN + size_of::<VelocityWire>();
            let mut buf = packet(kind, size);
            let body = VelocityWire {
                linear: F32::new(*linear),
                angular: F32::new(*angular),
            };
            buf.put_slice(body.as_bytes());
            finish(buf, size)
        }
        Command::Goal(pose) => {
            let size = PACKET_ID_LEN + size_of::<PoseWire>();
            let mut buf = packet(kind, size);
            buf.put_slice(PoseWire::from(pose).as_bytes());
            finish(buf, size)
        }
        Command::SetParams(text) => {
            let size = text_packet_size(text);
            let mut buf = packet(kind, size);
            buf.put_u32_le(text.len() as u32);
            buf.put_slice(text.as_bytes());
            finish(buf, size)
        }
        Command::Stop
        | Command::ClearMaps
        | Command::EnableImage
        | Command::DisableImage
        | Command::GetParams => finish(packet(kind, PACKET_ID_LEN), PACKET_ID_LEN),
    }
}

// ── Outbound decoding (client side) ──────────────────────────────────────────

/// A decoded occupancy grid packet.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPacket {
    pub kind: PacketKind,
    pub info: GridInfo,
    pub reset: bool,
    pub changes: Vec<GridChange>,
}

pub fn decode_grid(buf: &[u8]) -> Result<GridPacket, WireError> {
    let kind = PacketHeader::parse(buf)?;
    if !matches!(
        kind,
        PacketKind::Map | PacketKind::GlobalCostmap | PacketKind::LocalCostmap
    ) {
        return Err(WireError::UnexpectedKind(kind));
    }
    let body = &buf[PACKET_ID_LEN..];
    let header = read_prefix::<GridHeaderWire>(body)?;
    let count = header.change_count.get() as usize;
    let words = &body[size_of::<GridHeaderWire>()..];
    if words.len() != count * size_of::<u32>() {
        return Err(WireError::LengthMismatch {
            declared: count * size_of::<u32>(),
            actual: words.len(),
        });
    }
    let changes = words
        .chunks_exact(4)
        .map(|w| GridChange::unpack(u32::from_le_bytes([w[0], w[1], w[2], w[3]])))
        .collect();
    Ok(GridPacket {
        kind,
        info: GridInfo {
            width: header.width.get(),
            height: header.height.get(),
            resolution: header.resolution.get(),
            origin: Pose::from(&header.origin),
        },
        reset: header.reset != 0,
        changes,
    })
}

/// Decode a text block packet (diagnostics, parameter dumps).
pub fn decode_text(buf: &[u8]) -> Result<(PacketKind, String), WireError> {
    let kind = PacketHeader::parse(buf)?;
    let text = read_text_body(&buf[PACKET_ID_LEN..])?;
    let text = std::str::from_utf8(text).map_err(|_| WireError::InvalidUtf8)?;
    Ok((kind, text.to_string()))
}

fn read_prefix<T: FromBytes>(body: &[u8]) -> Result<T, WireError> {
    T::read_from_prefix(body).ok_or(WireError::Truncated {
        needed: PACKET_ID_LEN + size_of::<T>(),
        got: PACKET_ID_LEN + body.len(),
    })
}

fn read_text_body(body: &[u8]) -> Result<&[u8], WireError> {
    let len = read_prefix::<U32<LE>>(body)?.get() as usize;
    let rest = &body[size_of::<u32>()..];
    if rest.len() < len {
        return Err(WireError::LengthMismatch {
            declared: len,
            actual: rest.len(),
        });
    }
    Ok(&rest[..len])
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("packet truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("unknown packet tag {0:?}")]
    UnknownKind(String),

    #[error("packet kind {0:?} is not valid here")]
    UnexpectedKind(PacketKind),

    #[error("grid change index {index} exceeds the 24-bit limit")]
    IndexOverflow { index: u32 },

    #[error("declared length {declared} does not match {actual} available bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload of {0} elements does not fit a u32 length field")]
    TooLarge(usize),

    #[error("text block is not valid UTF-8")]
    InvalidUtf8,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
