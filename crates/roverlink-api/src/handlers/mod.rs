//! HTTP API handlers. Exposes gateway state as JSON and feeds telemetry in.

pub mod control;
pub mod status;
pub mod telemetry;
pub mod ws;

use axum::http::StatusCode;
use tokio::sync::{broadcast, mpsc, watch};

use roverlink_core::telemetry::PathStream;
use roverlink_services::{BusOutbox, ClientIdGen, ClientTable, GatewayEvent, GatewayStatus};

#[derive(Clone)]
pub struct ApiState {
    /// Into the dispatcher.
    pub events: mpsc::UnboundedSender<GatewayEvent>,
    /// Refreshed by the dispatcher after membership changes and every
    /// stats period.
    pub status: watch::Receiver<GatewayStatus>,
    pub clients: ClientTable,
    pub outbox: BusOutbox,
    /// Shared with the stream listener so ids are unique across transports.
    pub ids: ClientIdGen,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl ApiState {
    /// Hand an event to the dispatcher. Fails only once it has stopped.
    fn submit(&self, event: GatewayEvent) -> Result<(), (StatusCode, String)> {
        self.events.send(event).map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "gateway is not running".to_string(),
            )
        })
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn parse_path_stream(s: &str) -> Result<PathStream, (StatusCode, String)> {
    match s {
        "local" => Ok(PathStream::Local),
        "global" => Ok(PathStream::Global),
        other => Err((
            StatusCode::BAD_REQUEST,
            format!("unknown path stream '{other}' (expected local or global)"),
        )),
    }
}

pub use control::{handle_retarget_path, handle_shutdown};
pub use status::{handle_clients, handle_outbox, handle_status};
pub use telemetry::handle_telemetry;
pub use ws::handle_ws;
