//! POST /telemetry: the bus adapter's way in.
//!
//! The body is one tagged `TelemetryMessage`. Accepted messages are queued
//! for the dispatcher; the response does not wait for them to be applied.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use roverlink_core::telemetry::TelemetryMessage;
use roverlink_services::GatewayEvent;

use super::ApiState;

pub async fn handle_telemetry(
    State(state): State<ApiState>,
    Json(msg): Json<TelemetryMessage>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.submit(GatewayEvent::Telemetry(msg))?;
    Ok(StatusCode::ACCEPTED)
}
