//! roverlink services: the gateway's owned state and the logic that
//! drives it. Nothing in here performs I/O directly; sockets, processes and
//! the robot bus sit behind the traits in `collaborator` and `sink`.

pub mod collaborator;
pub mod delta;
pub mod gateway;
pub mod goal;
pub mod grid_store;
pub mod image_rate;
pub mod param_queue;
pub mod registry;
pub mod sink;
pub mod stats;
pub mod transforms;

pub use collaborator::{
    BusCommand, BusOutbox, JobId, JobKind, ProcessJob, ProcessLauncher, ProcessOutcome,
    PublishedCommand, RobotBus,
};
pub use gateway::{Gateway, GatewayEvent, GatewayStatus};
pub use registry::{ClientId, ClientIdGen, ClientInfo, ClientTable, Registry};
pub use sink::{ClientSink, MessageSink, Outbound, PendingBytes, SinkError, StreamSink, TransportKind};
