//! /status, /clients, /outbox handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use roverlink_services::{ClientInfo, GatewayStatus, PublishedCommand};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<GatewayStatus> {
    Json(state.status.borrow().clone())
}

// ── /clients ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ClientsResponse {
    pub clients: Vec<ClientInfo>,
}

pub async fn handle_clients(State(state): State<ApiState>) -> Json<ClientsResponse> {
    let mut clients: Vec<ClientInfo> = state.clients.iter().map(|e| e.value().clone()).collect();
    clients.sort_by_key(|c| c.id);
    Json(ClientsResponse { clients })
}

// ── /outbox ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct OutboxResponse {
    pub commands: Vec<PublishedCommand>,
}

pub async fn handle_outbox(State(state): State<ApiState>) -> Json<OutboxResponse> {
    Json(OutboxResponse {
        commands: state.outbox.snapshot(),
    })
}
