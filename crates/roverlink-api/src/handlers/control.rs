//! /paths/{stream}, /daemon/shutdown handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use roverlink_services::GatewayEvent;

use super::{parse_path_stream, ApiState};

// ── /paths/{stream} ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RetargetRequest {
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct RetargetResponse {
    pub stream: String,
    pub topic: String,
}

pub async fn handle_retarget_path(
    State(state): State<ApiState>,
    Path(stream_name): Path<String>,
    Json(req): Json<RetargetRequest>,
) -> Result<Json<RetargetResponse>, (StatusCode, String)> {
    let stream = parse_path_stream(&stream_name)?;
    if req.topic.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "topic must not be empty".to_string()));
    }
    state.submit(GatewayEvent::RetargetPath {
        stream,
        topic: req.topic.clone(),
    })?;
    Ok(Json(RetargetResponse {
        stream: stream_name,
        topic: req.topic,
    }))
}

// ── /daemon/shutdown ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());
    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
