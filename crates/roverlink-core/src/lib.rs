//! roverlink-core: wire format, telemetry value types, parameter trees
//! and configuration. Every other roverlink crate depends on this one.
//! Nothing in here performs I/O apart from loading the config file.

pub mod config;
pub mod params;
pub mod telemetry;
pub mod wire;

pub use telemetry::{GridSnapshot, GridStream, PathStream, Pose, TelemetryMessage};
pub use wire::{Command, PacketKind, WireError};
